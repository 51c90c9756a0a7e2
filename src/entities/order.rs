use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Enum representing the possible fulfillment statuses of an order.
///
/// The normal chain runs pending → confirmed → processing → shipped →
/// {partially_delivered | delivered}. The cancellation branch
/// (cancel_requested → cancelled | cancel_rejected) is driven exclusively by
/// the cancellation workflow, never by plain status updates.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "partially_delivered")]
    PartiallyDelivered,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancel_requested")]
    CancelRequested,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "cancel_rejected")]
    CancelRejected,
}

impl OrderStatus {
    /// No further fulfillment transitions are possible from these states.
    pub fn is_frozen(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::CancelRejected
        )
    }

    /// States owned by the cancellation workflow.
    pub fn in_cancellation_flow(&self) -> bool {
        matches!(
            self,
            OrderStatus::CancelRequested | OrderStatus::Cancelled | OrderStatus::CancelRejected
        )
    }
}

/// The `orders` table. Rows are never physically deleted; terminal states are
/// retained for audit.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-readable unique order number, generated at checkout from a date
    /// stamp, a company fragment and a random sequence.
    pub order_number: String,

    /// Company that owns the order.
    pub company_id: Uuid,

    /// User who placed the order.
    pub placed_by: Uuid,

    pub status: OrderStatus,

    /// Sum of item line totals, computed from the authoritative product
    /// prices at order time.
    pub total_amount: Decimal,

    /// Upstream multi-party purchase approval bookkeeping. Display-only;
    /// never drives fulfillment transitions.
    pub approval_completed: bool,

    // Delivery address snapshot, copied at order time, immutable afterward.
    pub shipping_name: String,
    pub shipping_company: String,
    pub shipping_postal_code: String,
    pub shipping_prefecture: String,
    pub shipping_city: String,
    pub shipping_address1: String,
    pub shipping_address2: Option<String>,
    pub shipping_phone: String,

    /// Customer-supplied reason, set when a cancellation is requested.
    pub cancel_reason: Option<String>,

    /// Staff-supplied reason, set when a cancellation request is rejected.
    /// Retained alongside `cancel_reason` for audit display.
    pub cancel_reject_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::paperwork::Entity")]
    Paperwork,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::paperwork::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Paperwork.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
