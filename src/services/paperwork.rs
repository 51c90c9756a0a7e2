use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::{self, DbPool},
    entities::order,
    entities::order_item,
    entities::paperwork::{self, Entity as PaperworkEntity, PaperworkStatus, PaperworkType},
    errors::ServiceError,
    events::{Event, EventSender},
    retry::{bounded_retry, Attempt},
};

lazy_static! {
    static ref PAPERWORK_ACTIONS: IntCounterVec = register_int_counter_vec!(
        "order_paperwork_actions_total",
        "Total number of paperwork lifecycle actions",
        &["action"]
    )
    .expect("metric can be created");
}

/// Manages draft → finalized (→ approved, receipts only) document
/// progression, numbering and rendering.
#[derive(Clone)]
pub struct PaperworkService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    unique_number_max_attempts: u32,
}

impl PaperworkService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        unique_number_max_attempts: u32,
    ) -> Self {
        Self {
            db,
            event_sender,
            unique_number_max_attempts,
        }
    }

    /// Creates a draft document for an order. Numbers are sequential per
    /// (order, type); reissues are allowed, so cardinality is unbounded but
    /// each number is unique within its scope.
    #[instrument(skip(self), fields(order_id = %order_id, doc_type = %doc_type))]
    pub async fn create_document(
        &self,
        order_id: Uuid,
        doc_type: PaperworkType,
        delivery_date: Option<NaiveDate>,
        created_by: Uuid,
    ) -> Result<paperwork::Model, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::from_db)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let delivery_date = delivery_date.unwrap_or_else(|| Utc::now().date_naive());

        // A concurrent creation for the same (order, type) produces the same
        // sequence number; the unique index catches it and the recount on
        // the next attempt moves past it.
        let document = bounded_retry(self.unique_number_max_attempts, "document number", |_| {
            let db = self.db.clone();
            let order_number = order.order_number.clone();
            async move {
                let txn = db.begin().await.map_err(ServiceError::from_db)?;

                let existing = PaperworkEntity::find()
                    .filter(paperwork::Column::OrderId.eq(order_id))
                    .filter(paperwork::Column::DocType.eq(doc_type))
                    .count(&txn)
                    .await
                    .map_err(ServiceError::from_db)?;

                let now = Utc::now();
                let row = paperwork::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    doc_type: Set(doc_type),
                    document_number: Set(compose_document_number(
                        doc_type,
                        &order_number,
                        existing + 1,
                    )),
                    status: Set(PaperworkStatus::Draft),
                    delivery_date: Set(delivery_date),
                    approved: Set(false),
                    approved_by: Set(None),
                    approved_at: Set(None),
                    created_by: Set(created_by),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                };

                let inserted = match row.insert(&txn).await {
                    Ok(model) => model,
                    Err(e) if db::is_unique_violation(&e) => return Ok(Attempt::Collision),
                    Err(e) => return Err(ServiceError::from_db(e)),
                };

                txn.commit().await.map_err(ServiceError::from_db)?;
                Ok(Attempt::Done(inserted))
            }
        })
        .await?;

        PAPERWORK_ACTIONS.with_label_values(&["created"]).inc();
        info!(
            paperwork_id = %document.id,
            document_number = %document.document_number,
            "Paperwork created"
        );

        self.emit(Event::PaperworkCreated {
            order_id,
            paperwork_id: document.id,
        })
        .await;

        Ok(document)
    }

    /// Finalizes a draft. Irreversible: afterwards the document is an
    /// immutable legal record, except for the receipt approval stamp.
    #[instrument(skip(self), fields(document_id = %document_id))]
    pub async fn finalize(&self, document_id: Uuid) -> Result<paperwork::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::from_db)?;

        let document = Self::find_in_txn(&txn, document_id).await?;

        if document.status == PaperworkStatus::Finalized {
            return Err(ServiceError::InvalidOperation(format!(
                "Document '{}' is already finalized",
                document.document_number
            )));
        }

        let mut active: paperwork::ActiveModel = document.into();
        active.status = Set(PaperworkStatus::Finalized);
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(&txn).await.map_err(ServiceError::from_db)?;
        txn.commit().await.map_err(ServiceError::from_db)?;

        PAPERWORK_ACTIONS.with_label_values(&["finalized"]).inc();
        info!(document_number = %updated.document_number, "Paperwork finalized");

        self.emit(Event::PaperworkFinalized(document_id)).await;

        Ok(updated)
    }

    /// Stamps approval on a finalized receipt. Applied once; irreversible.
    #[instrument(skip(self), fields(document_id = %document_id, approver = %approver))]
    pub async fn approve(
        &self,
        document_id: Uuid,
        approver: Uuid,
    ) -> Result<paperwork::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::from_db)?;

        let document = Self::find_in_txn(&txn, document_id).await?;

        if document.doc_type != PaperworkType::Receipt {
            return Err(ServiceError::InvalidOperation(format!(
                "Only receipts can be approved; '{}' is a {}",
                document.document_number, document.doc_type
            )));
        }
        if document.status != PaperworkStatus::Finalized {
            return Err(ServiceError::InvalidOperation(format!(
                "Receipt '{}' must be finalized before approval",
                document.document_number
            )));
        }
        if document.approved {
            return Err(ServiceError::InvalidOperation(format!(
                "Receipt '{}' is already approved",
                document.document_number
            )));
        }

        let mut active: paperwork::ActiveModel = document.into();
        active.approved = Set(true);
        active.approved_by = Set(Some(approver));
        active.approved_at = Set(Some(Utc::now()));
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(&txn).await.map_err(ServiceError::from_db)?;
        txn.commit().await.map_err(ServiceError::from_db)?;

        PAPERWORK_ACTIONS.with_label_values(&["approved"]).inc();
        info!(document_number = %updated.document_number, %approver, "Receipt approved");

        self.emit(Event::PaperworkApproved(document_id)).await;

        Ok(updated)
    }

    #[instrument(skip(self), fields(document_id = %document_id))]
    pub async fn find_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<paperwork::Model>, ServiceError> {
        PaperworkEntity::find_by_id(document_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::from_db)
    }

    /// Lists an order's documents in stable (document number) order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn list_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<paperwork::Model>, ServiceError> {
        PaperworkEntity::find()
            .filter(paperwork::Column::OrderId.eq(order_id))
            .order_by_asc(paperwork::Column::DocumentNumber)
            .all(&*self.db)
            .await
            .map_err(ServiceError::from_db)
    }

    async fn find_in_txn<C: sea_orm::ConnectionTrait>(
        conn: &C,
        document_id: Uuid,
    ) -> Result<paperwork::Model, ServiceError> {
        PaperworkEntity::find_by_id(document_id)
            .one(conn)
            .await
            .map_err(ServiceError::from_db)?
            .ok_or_else(|| ServiceError::NotFound(format!("Paperwork {document_id} not found")))
    }

    async fn emit(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, "Failed to send paperwork event");
            }
        }
    }
}

fn compose_document_number(doc_type: PaperworkType, order_number: &str, sequence: u64) -> String {
    format!(
        "{}-{}-{:02}",
        doc_type.number_prefix(),
        order_number,
        sequence
    )
}

// ---------------------------------------------------------------------------
// Rendering

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RenderedLine {
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RenderedApproval {
    pub approved_by: Uuid,
    pub approved_at: DateTime<Utc>,
}

/// Renderable projection of a document plus its order snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RenderedPaperwork {
    pub document_number: String,
    pub title: String,
    pub status: PaperworkStatus,
    pub order_number: String,
    pub delivery_date: NaiveDate,
    pub recipient_name: String,
    pub recipient_company: String,
    pub recipient_postal_code: String,
    pub recipient_prefecture: String,
    pub recipient_city: String,
    pub recipient_address1: String,
    pub recipient_address2: Option<String>,
    pub recipient_phone: String,
    pub lines: Vec<RenderedLine>,
    pub total_amount: Decimal,
    pub approval: Option<RenderedApproval>,
}

/// Pure projection: composes the document's stored fields with the live
/// order/item snapshot. Reads no clock and mutates nothing, so identical
/// stored state renders byte-identically — audit replay depends on that.
pub fn render(
    document: &paperwork::Model,
    order: &order::Model,
    items: &[order_item::Model],
) -> RenderedPaperwork {
    RenderedPaperwork {
        document_number: document.document_number.clone(),
        title: document.doc_type.title().to_string(),
        status: document.status,
        order_number: order.order_number.clone(),
        delivery_date: document.delivery_date,
        recipient_name: order.shipping_name.clone(),
        recipient_company: order.shipping_company.clone(),
        recipient_postal_code: order.shipping_postal_code.clone(),
        recipient_prefecture: order.shipping_prefecture.clone(),
        recipient_city: order.shipping_city.clone(),
        recipient_address1: order.shipping_address1.clone(),
        recipient_address2: order.shipping_address2.clone(),
        recipient_phone: order.shipping_phone.clone(),
        lines: items
            .iter()
            .map(|item| RenderedLine {
                product_name: item.product_name.clone(),
                sku: item.sku.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.total_price,
            })
            .collect(),
        total_amount: order.total_amount,
        approval: document.approved_at.zip(document.approved_by).map(
            |(approved_at, approved_by)| RenderedApproval {
                approved_by,
                approved_at,
            },
        ),
    }
}

impl RenderedPaperwork {
    /// Deterministic plain-text form used for downloads.
    pub fn to_plain_text(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title);
        let _ = writeln!(out, "No. {}", self.document_number);
        if self.status == PaperworkStatus::Draft {
            let _ = writeln!(out, "--- DRAFT - NOT FINALIZED ---");
        }
        let _ = writeln!(out, "Order: {}", self.order_number);
        let _ = writeln!(out, "Delivery date: {}", self.delivery_date.format("%Y-%m-%d"));
        out.push('\n');

        let _ = writeln!(out, "{} ({})", self.recipient_name, self.recipient_company);
        let _ = writeln!(
            out,
            "{} {} {}",
            self.recipient_postal_code, self.recipient_prefecture, self.recipient_city
        );
        let _ = writeln!(out, "{}", self.recipient_address1);
        if let Some(address2) = &self.recipient_address2 {
            let _ = writeln!(out, "{}", address2);
        }
        let _ = writeln!(out, "Tel: {}", self.recipient_phone);
        out.push('\n');

        for line in &self.lines {
            let _ = writeln!(
                out,
                "{} [{}] x{} @ {} = {}",
                line.product_name, line.sku, line.quantity, line.unit_price, line.line_total
            );
        }
        out.push('\n');
        let _ = writeln!(out, "TOTAL: {}", self.total_amount);

        if let Some(approval) = &self.approval {
            let _ = writeln!(
                out,
                "Approved by {} at {}",
                approval.approved_by,
                approval.approved_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }

        out
    }
}
