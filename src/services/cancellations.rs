use std::sync::Arc;

use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

lazy_static! {
    static ref CANCELLATION_ACTIONS: IntCounterVec = register_int_counter_vec!(
        "order_cancellation_actions_total",
        "Total number of cancellation workflow actions",
        &["action"]
    )
    .expect("metric can be created");
}

/// Customer-request → staff-arbitration sub-flow layered on top of the order
/// status. Owns every move into and out of the cancellation branch.
#[derive(Clone)]
pub struct CancellationService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl CancellationService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Files a cancellation request. Only orders that have not started
    /// processing (pending or confirmed) are eligible.
    #[instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn request_cancellation(
        &self,
        order_id: Uuid,
        reason: &str,
    ) -> Result<order::Model, ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "Cancellation reason is required".to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(ServiceError::from_db)?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::from_db)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        check_cancellation_eligibility(order.status)?;

        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::CancelRequested);
        active.cancel_reason = Set(Some(reason.to_string()));
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await.map_err(ServiceError::from_db)?;
        txn.commit().await.map_err(ServiceError::from_db)?;

        CANCELLATION_ACTIONS.with_label_values(&["requested"]).inc();
        info!(%order_id, "Cancellation requested");

        self.emit(Event::CancellationRequested(order_id)).await;

        Ok(updated)
    }

    /// Approves a pending cancellation request: the order becomes cancelled,
    /// terminally.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn approve_cancellation(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::from_db)?;

        let order = Self::find_with_pending_request(&txn, order_id).await?;

        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await.map_err(ServiceError::from_db)?;
        txn.commit().await.map_err(ServiceError::from_db)?;

        CANCELLATION_ACTIONS.with_label_values(&["approved"]).inc();
        info!(%order_id, "Cancellation approved, order cancelled");

        self.emit(Event::CancellationApproved(order_id)).await;

        Ok(updated)
    }

    /// Rejects a pending cancellation request. The original customer reason
    /// is retained next to the rejection reason for audit display.
    #[instrument(skip(self, rejection_reason), fields(order_id = %order_id))]
    pub async fn reject_cancellation(
        &self,
        order_id: Uuid,
        rejection_reason: &str,
    ) -> Result<order::Model, ServiceError> {
        let rejection_reason = rejection_reason.trim();
        if rejection_reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "Rejection reason is required".to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(ServiceError::from_db)?;

        let order = Self::find_with_pending_request(&txn, order_id).await?;

        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::CancelRejected);
        active.cancel_reject_reason = Set(Some(rejection_reason.to_string()));
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await.map_err(ServiceError::from_db)?;
        txn.commit().await.map_err(ServiceError::from_db)?;

        CANCELLATION_ACTIONS.with_label_values(&["rejected"]).inc();
        info!(%order_id, "Cancellation rejected");

        self.emit(Event::CancellationRejected(order_id)).await;

        Ok(updated)
    }

    async fn find_with_pending_request<C: sea_orm::ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(conn)
            .await
            .map_err(ServiceError::from_db)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if order.status != OrderStatus::CancelRequested {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {order_id} has no pending cancellation request (status '{}')",
                order.status
            )));
        }

        Ok(order)
    }

    async fn emit(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, "Failed to send cancellation event");
            }
        }
    }
}

/// Only orders that have not started processing may request cancellation.
/// A rejected cancellation is terminal for that order; there is no
/// re-request path.
pub fn check_cancellation_eligibility(status: OrderStatus) -> Result<(), ServiceError> {
    match status {
        OrderStatus::Pending | OrderStatus::Confirmed => Ok(()),
        OrderStatus::CancelRequested => Err(ServiceError::InvalidOperation(
            "A cancellation request is already pending for this order".to_string(),
        )),
        other => Err(ServiceError::InvalidOperation(format!(
            "Order in status '{other}' is not eligible for cancellation"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sea_orm::Iterable;

    #[test]
    fn only_pending_and_confirmed_are_eligible() {
        let eligible: Vec<OrderStatus> = OrderStatus::iter()
            .filter(|s| check_cancellation_eligibility(*s).is_ok())
            .collect();
        assert_eq!(eligible, vec![OrderStatus::Pending, OrderStatus::Confirmed]);
    }

    #[test]
    fn in_flight_fulfillment_is_not_eligible() {
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::PartiallyDelivered,
            OrderStatus::Delivered,
        ] {
            let err = check_cancellation_eligibility(status).unwrap_err();
            assert_matches!(err, ServiceError::InvalidOperation(_));
            assert!(err.to_string().contains("not eligible"));
        }
    }

    #[test]
    fn duplicate_request_is_called_out() {
        let err = check_cancellation_eligibility(OrderStatus::CancelRequested).unwrap_err();
        assert!(err.to_string().contains("already pending"));
    }
}
