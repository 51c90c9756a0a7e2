use std::sync::Arc;

use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

lazy_static! {
    static ref ORDER_STATUS_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "order_status_transitions_total",
        "Total number of applied order status transitions",
        &["from", "to"]
    )
    .expect("metric can be created");
    static ref ORDER_STATUS_REJECTIONS: IntCounter = register_int_counter!(
        "order_status_rejections_total",
        "Total number of rejected order status transitions"
    )
    .expect("metric can be created");
}

/// Validates and applies fulfillment-status transitions. The cancellation
/// branch is off-limits here; it belongs to the cancellation workflow.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Applies a single forward fulfillment transition.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn set_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::from_db)?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::from_db)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let old_status = order.status;
        if let Err(e) = check_transition(old_status, new_status) {
            ORDER_STATUS_REJECTIONS.inc();
            return Err(e);
        }

        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let updated = active.update(&txn).await.map_err(ServiceError::from_db)?;
        txn.commit().await.map_err(ServiceError::from_db)?;

        let (from_label, to_label) = (old_status.to_string(), new_status.to_string());
        ORDER_STATUS_TRANSITIONS
            .with_label_values(&[from_label.as_str(), to_label.as_str()])
            .inc();
        info!(%order_id, %old_status, %new_status, "Order status updated");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::OrderStatusChanged {
                    order_id,
                    old_status: old_status.to_string(),
                    new_status: new_status.to_string(),
                })
                .await
            {
                warn!(error = %e, %order_id, "Failed to send order status changed event");
            }
        }

        Ok(updated)
    }

    /// Applies the single-order rule independently to each id. One order's
    /// rejection never rolls back another's success; callers get a per-id
    /// outcome instead of all-or-nothing.
    #[instrument(skip(self, order_ids), fields(count = order_ids.len(), new_status = %new_status))]
    pub async fn bulk_set_status(
        &self,
        order_ids: Vec<Uuid>,
        new_status: OrderStatus,
    ) -> Result<BulkStatusOutcome, ServiceError> {
        let mut outcome = BulkStatusOutcome {
            updated: Vec::new(),
            skipped: Vec::new(),
        };

        for order_id in order_ids {
            match self.set_status(order_id, new_status).await {
                Ok(_) => outcome.updated.push(order_id),
                Err(e) => {
                    warn!(%order_id, error = %e, "Skipping order in bulk status update");
                    outcome.skipped.push(SkippedOrder {
                        order_id,
                        reason: e.response_message(),
                    });
                }
            }
        }

        info!(
            updated = outcome.updated.len(),
            skipped = outcome.skipped.len(),
            %new_status,
            "Bulk status update finished"
        );

        Ok(outcome)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SkippedOrder {
    pub order_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkStatusOutcome {
    pub updated: Vec<Uuid>,
    pub skipped: Vec<SkippedOrder>,
}

impl BulkStatusOutcome {
    pub fn updated_count(&self) -> usize {
        self.updated.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Validates one transition request against the fulfillment chain.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), ServiceError> {
    if to.in_cancellation_flow() {
        return Err(ServiceError::InvalidOperation(format!(
            "Status '{to}' is set by the cancellation workflow, not by a status update"
        )));
    }
    if from.is_frozen() {
        return Err(ServiceError::TerminalState(from.to_string()));
    }
    if from == OrderStatus::CancelRequested {
        return Err(ServiceError::InvalidOperation(
            "Order has a pending cancellation request awaiting arbitration".to_string(),
        ));
    }
    if !is_forward_move(from, to) {
        return Err(ServiceError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

/// The fulfillment chain. `partially_delivered` is an optional waypoint:
/// `shipped` may move to it or go straight to `delivered`.
fn is_forward_move(from: OrderStatus, to: OrderStatus) -> bool {
    matches!(
        (from, to),
        (OrderStatus::Pending, OrderStatus::Confirmed)
            | (OrderStatus::Confirmed, OrderStatus::Processing)
            | (OrderStatus::Processing, OrderStatus::Shipped)
            | (OrderStatus::Shipped, OrderStatus::PartiallyDelivered)
            | (OrderStatus::Shipped, OrderStatus::Delivered)
            | (OrderStatus::PartiallyDelivered, OrderStatus::Delivered)
    )
}

/// Presentation status shown to operators and customers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    OrderReceived,
    Confirmed,
    Processing,
    Shipped,
    PartiallyDelivered,
    Delivered,
    CancellationRequested,
    Cancelled,
    CancellationRejected,
}

impl DisplayStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DisplayStatus::OrderReceived => "order received",
            DisplayStatus::Confirmed => "confirmed",
            DisplayStatus::Processing => "processing",
            DisplayStatus::Shipped => "shipped",
            DisplayStatus::PartiallyDelivered => "partially delivered",
            DisplayStatus::Delivered => "delivered",
            DisplayStatus::CancellationRequested => "cancellation requested",
            DisplayStatus::Cancelled => "cancelled",
            DisplayStatus::CancellationRejected => "cancellation rejected",
        }
    }
}

/// Read-time projection of the stored status for presentation; never written
/// back. A pending order whose upstream purchase approval has completed is
/// still presented as "order received" — the approval bookkeeping must not
/// surface as a distinct status.
pub fn display_status(order: &order::Model) -> DisplayStatus {
    match order.status {
        OrderStatus::Pending => DisplayStatus::OrderReceived,
        OrderStatus::Confirmed => DisplayStatus::Confirmed,
        OrderStatus::Processing => DisplayStatus::Processing,
        OrderStatus::Shipped => DisplayStatus::Shipped,
        OrderStatus::PartiallyDelivered => DisplayStatus::PartiallyDelivered,
        OrderStatus::Delivered => DisplayStatus::Delivered,
        OrderStatus::CancelRequested => DisplayStatus::CancellationRequested,
        OrderStatus::Cancelled => DisplayStatus::Cancelled,
        OrderStatus::CancelRejected => DisplayStatus::CancellationRejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::Iterable;

    fn order_fixture(status: OrderStatus, approval_completed: bool) -> order::Model {
        let now = Utc::now();
        order::Model {
            id: Uuid::new_v4(),
            order_number: "20250301-ABCDEF-0001".to_string(),
            company_id: Uuid::new_v4(),
            placed_by: Uuid::new_v4(),
            status,
            total_amount: dec!(1000),
            approval_completed,
            shipping_name: "Taro Yamada".to_string(),
            shipping_company: "Yamada Kogyo".to_string(),
            shipping_postal_code: "100-0001".to_string(),
            shipping_prefecture: "Tokyo".to_string(),
            shipping_city: "Chiyoda-ku".to_string(),
            shipping_address1: "1-1-1 Chiyoda".to_string(),
            shipping_address2: None,
            shipping_phone: "03-1234-5678".to_string(),
            cancel_reason: None,
            cancel_reject_reason: None,
            created_at: now,
            updated_at: Some(now),
            version: 1,
        }
    }

    #[test]
    fn exactly_six_forward_edges_exist() {
        let mut allowed = 0;
        for from in OrderStatus::iter() {
            for to in OrderStatus::iter() {
                if check_transition(from, to).is_ok() {
                    allowed += 1;
                }
            }
        }
        assert_eq!(allowed, 6);
    }

    #[test]
    fn skipping_stages_is_rejected() {
        assert_matches!(
            check_transition(OrderStatus::Pending, OrderStatus::Shipped),
            Err(ServiceError::InvalidTransition { .. })
        );
        assert_matches!(
            check_transition(OrderStatus::Pending, OrderStatus::Delivered),
            Err(ServiceError::InvalidTransition { .. })
        );
    }

    #[test]
    fn backward_moves_are_rejected() {
        assert_matches!(
            check_transition(OrderStatus::Shipped, OrderStatus::Processing),
            Err(ServiceError::InvalidTransition { .. })
        );
        assert_matches!(
            check_transition(OrderStatus::Confirmed, OrderStatus::Pending),
            Err(ServiceError::InvalidTransition { .. })
        );
    }

    #[test]
    fn same_status_is_not_a_valid_move() {
        assert_matches!(
            check_transition(OrderStatus::Shipped, OrderStatus::Shipped),
            Err(ServiceError::InvalidTransition { .. })
        );
    }

    #[test]
    fn partially_delivered_is_optional() {
        assert!(check_transition(OrderStatus::Shipped, OrderStatus::Delivered).is_ok());
        assert!(check_transition(OrderStatus::Shipped, OrderStatus::PartiallyDelivered).is_ok());
        assert!(check_transition(OrderStatus::PartiallyDelivered, OrderStatus::Delivered).is_ok());
    }

    #[test]
    fn frozen_states_reject_everything() {
        for from in [
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::CancelRejected,
        ] {
            assert_matches!(
                check_transition(from, OrderStatus::Confirmed),
                Err(ServiceError::TerminalState(_))
            );
        }
    }

    #[test]
    fn cancellation_branch_is_off_limits() {
        assert_matches!(
            check_transition(OrderStatus::Pending, OrderStatus::Cancelled),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(
            check_transition(OrderStatus::Confirmed, OrderStatus::CancelRequested),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(
            check_transition(OrderStatus::CancelRequested, OrderStatus::Processing),
            Err(ServiceError::InvalidOperation(_))
        );
    }

    #[test]
    fn pending_is_displayed_as_order_received_regardless_of_approval() {
        let plain = order_fixture(OrderStatus::Pending, false);
        let approved = order_fixture(OrderStatus::Pending, true);
        assert_eq!(display_status(&plain), DisplayStatus::OrderReceived);
        assert_eq!(display_status(&approved), DisplayStatus::OrderReceived);
        assert_eq!(display_status(&approved).label(), "order received");
    }

    #[test]
    fn display_projection_covers_every_status() {
        for status in OrderStatus::iter() {
            let order = order_fixture(status, false);
            // Labels are lowercase human phrases.
            let label = display_status(&order).label();
            assert!(!label.is_empty());
            assert_eq!(label, label.to_lowercase());
        }
    }
}
