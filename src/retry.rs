//! Bounded retry for unique-candidate generation.
//!
//! Order numbers and document numbers are generated optimistically and
//! inserted under a unique constraint; a collision rolls the attempt back and
//! a fresh candidate is generated, up to a configured ceiling.

use std::future::Future;

use tracing::warn;

use crate::errors::ServiceError;

/// Outcome of one attempt inside [`bounded_retry`].
pub enum Attempt<T> {
    /// The candidate was committed.
    Done(T),
    /// The candidate collided with an existing row; regenerate and retry.
    Collision,
}

/// Runs `op` until it commits, up to `max_attempts` times. Collisions are
/// retried with a fresh candidate; any other error aborts immediately. When
/// the attempts are exhausted the caller gets a [`ServiceError::Conflict`] —
/// callers do not retry on top of this.
pub async fn bounded_retry<T, F, Fut>(
    max_attempts: u32,
    what: &str,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, ServiceError>>,
{
    for attempt in 1..=max_attempts {
        match op(attempt).await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Collision => {
                warn!(attempt, max_attempts, what, "unique candidate collided, regenerating");
            }
        }
    }

    Err(ServiceError::Conflict(format!(
        "could not allocate a unique {what} after {max_attempts} attempts"
    )))
}
