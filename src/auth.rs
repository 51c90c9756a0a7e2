//! Actor identity handed over by the upstream authentication gateway.
//!
//! Authentication itself (sessions, MFA, token verification) lives in front
//! of this service; requests arrive with verified identity headers. The
//! [`Actor`] extractor rejects requests that are missing them.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

const ACTOR_ID_HEADER: &str = "x-actor-id";
const COMPANY_ID_HEADER: &str = "x-company-id";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Back-office operator; may drive fulfillment, arbitrate cancellations
    /// and manage paperwork for any company.
    Staff,
    /// Buyer-side user; scoped to their own company's orders.
    Customer,
}

/// The authenticated caller of a facade operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn staff(user_id: Uuid, company_id: Uuid) -> Self {
        Self {
            user_id,
            company_id,
            role: ActorRole::Staff,
        }
    }

    pub fn customer(user_id: Uuid, company_id: Uuid) -> Self {
        Self {
            user_id,
            company_id,
            role: ActorRole::Customer,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role == ActorRole::Staff
    }
}

fn required_header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ServiceError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized(format!("missing {name} header")))
}

fn parse_uuid_header(parts: &Parts, name: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(required_header(parts, name)?)
        .map_err(|_| ServiceError::Unauthorized(format!("malformed {name} header")))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parse_uuid_header(parts, ACTOR_ID_HEADER)?;
        let company_id = parse_uuid_header(parts, COMPANY_ID_HEADER)?;
        let role = match required_header(parts, ACTOR_ROLE_HEADER)? {
            "staff" => ActorRole::Staff,
            "customer" => ActorRole::Customer,
            other => {
                return Err(ServiceError::Unauthorized(format!(
                    "unknown actor role '{other}'"
                )))
            }
        };

        Ok(Actor {
            user_id,
            company_id,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_headers(headers: &[(&str, String)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn extracts_staff_actor() {
        let user = Uuid::new_v4();
        let company = Uuid::new_v4();
        let mut parts = parts_with_headers(&[
            (ACTOR_ID_HEADER, user.to_string()),
            (COMPANY_ID_HEADER, company.to_string()),
            (ACTOR_ROLE_HEADER, "staff".to_string()),
        ]);

        let actor = Actor::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(actor.is_staff());
        assert_eq!(actor.user_id, user);
        assert_eq!(actor.company_id, company);
    }

    #[tokio::test]
    async fn missing_headers_are_unauthorized() {
        let mut parts = parts_with_headers(&[]);
        let err = Actor::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unknown_role_is_unauthorized() {
        let mut parts = parts_with_headers(&[
            (ACTOR_ID_HEADER, Uuid::new_v4().to_string()),
            (COMPANY_ID_HEADER, Uuid::new_v4().to_string()),
            (ACTOR_ROLE_HEADER, "superuser".to_string()),
        ]);
        let err = Actor::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
