use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of document attached to an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
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
pub enum PaperworkType {
    #[sea_orm(string_value = "delivery_note")]
    DeliveryNote,
    #[sea_orm(string_value = "receipt")]
    Receipt,
}

impl PaperworkType {
    /// Prefix used when composing document numbers.
    pub fn number_prefix(&self) -> &'static str {
        match self {
            PaperworkType::DeliveryNote => "DN",
            PaperworkType::Receipt => "RC",
        }
    }

    /// Heading printed on the rendered document.
    pub fn title(&self) -> &'static str {
        match self {
            PaperworkType::DeliveryNote => "DELIVERY NOTE",
            PaperworkType::Receipt => "RECEIPT",
        }
    }
}

/// Lifecycle status of a document. Finalization is irreversible: a finalized
/// document is an immutable legal record, except for the receipt approval
/// stamp.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
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
pub enum PaperworkStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "finalized")]
    Finalized,
}

/// The `order_paperwork` table. Documents reference the order's item/total
/// snapshot at render time rather than holding their own copy; order items
/// are immutable, so re-reads are stable. No deletion path exists.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_paperwork")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub doc_type: PaperworkType,

    /// Sequential per (order, type); unique within that scope. Stable once
    /// issued.
    pub document_number: String,

    pub status: PaperworkStatus,

    /// Defaults to the creation date when not supplied.
    pub delivery_date: NaiveDate,

    /// Approval stamp, receipts only. Applied once, after finalization,
    /// irreversible.
    pub approved: bool,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,

    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_prefixes() {
        assert_eq!(PaperworkType::DeliveryNote.number_prefix(), "DN");
        assert_eq!(PaperworkType::Receipt.number_prefix(), "RC");
    }

    #[test]
    fn type_literals_are_snake_case() {
        assert_eq!(PaperworkType::DeliveryNote.to_string(), "delivery_note");
        assert_eq!(PaperworkStatus::Finalized.to_string(), "finalized");
    }
}
