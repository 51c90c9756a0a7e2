use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{self, DbPool},
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::product::Entity as ProductEntity,
    errors::ServiceError,
    events::{Event, EventSender},
    retry::{bounded_retry, Attempt},
};

/// Request/Response types for the order service

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Client-claimed unit price; revalidated against the product price
    /// rather than trusted.
    pub unit_price: Option<Decimal>,
}

/// Delivery address, snapshotted onto the order at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct DeliveryAddress {
    #[validate(length(min = 1, max = 100, message = "Recipient name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Recipient company is required"))]
    pub company: String,
    #[validate(length(min = 1, max = 16, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 50, message = "Prefecture is required"))]
    pub prefecture: String,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 200, message = "Address line 1 is required"))]
    pub address1: String,
    pub address2: Option<String>,
    #[validate(length(min = 1, max = 30, message = "Phone number is required"))]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderInput {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemInput>,
    #[validate]
    pub delivery_address: DeliveryAddress,
    /// Client-computed total; revalidated against the authoritative total.
    pub total_amount: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub company_id: Uuid,
    pub placed_by: Uuid,
    pub status: OrderStatus,
    /// Read-time presentation label; never persisted.
    pub display_status: String,
    pub total_amount: Decimal,
    pub approval_completed: bool,
    pub delivery_address: DeliveryAddress,
    pub cancel_reason: Option<String>,
    pub cancel_reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl OrderResponse {
    pub fn from_model(model: order::Model) -> Self {
        let display_status = super::order_status::display_status(&model)
            .label()
            .to_string();
        Self {
            id: model.id,
            order_number: model.order_number,
            company_id: model.company_id,
            placed_by: model.placed_by,
            status: model.status,
            display_status,
            total_amount: model.total_amount,
            approval_completed: model.approval_completed,
            delivery_address: DeliveryAddress {
                name: model.shipping_name,
                company: model.shipping_company,
                postal_code: model.shipping_postal_code,
                prefecture: model.shipping_prefecture,
                city: model.shipping_city,
                address1: model.shipping_address1,
                address2: model.shipping_address2,
                phone: model.shipping_phone,
            },
            cancel_reason: model.cancel_reason,
            cancel_reject_reason: model.cancel_reject_reason,
            created_at: model.created_at,
            updated_at: model.updated_at,
            version: model.version,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(model: order_item::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            product_name: model.product_name,
            sku: model.sku,
            quantity: model.quantity,
            unit_price: model.unit_price,
            total_price: model.total_price,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service owning the Order + OrderItem aggregate.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    unique_number_max_attempts: u32,
}

impl OrderService {
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

    /// Creates an order for the given company: revalidates every item price
    /// against the product table, snapshots items, and commits order + items
    /// in one transaction under a freshly generated order number.
    #[instrument(skip(self, input), fields(company_id = %company_id, item_count = input.items.len()))]
    pub async fn create_order(
        &self,
        company_id: Uuid,
        placed_by: Uuid,
        input: CreateOrderInput,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        // Price each line from the authoritative product record.
        let mut total = Decimal::ZERO;
        let mut lines = Vec::with_capacity(input.items.len());
        for item in &input.items {
            item.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

            let product = ProductEntity::find_by_id(item.product_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::from_db)?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!("Unknown product {}", item.product_id))
                })?;

            if !product.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "Product '{}' is no longer orderable",
                    product.sku
                )));
            }

            if let Some(claimed) = item.unit_price {
                if claimed != product.unit_price {
                    return Err(ServiceError::ValidationError(format!(
                        "Unit price for SKU '{}' does not match the current price",
                        product.sku
                    )));
                }
            }

            let line_total = line_total(product.unit_price, item.quantity);
            total += line_total;
            lines.push((product, item.quantity, line_total));
        }

        if let Some(claimed_total) = input.total_amount {
            if claimed_total != total {
                return Err(ServiceError::ValidationError(format!(
                    "Total amount {claimed_total} does not match the priced total {total}"
                )));
            }
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let item_rows: Vec<order_item::ActiveModel> = lines
            .iter()
            .map(|(product, quantity, line_total)| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                sku: Set(product.sku.clone()),
                quantity: Set(*quantity),
                unit_price: Set(product.unit_price),
                total_price: Set(*line_total),
                created_at: Set(now),
            })
            .collect();
        let address = input.delivery_address;

        // Uniqueness is enforced by the store; a collision rolls the whole
        // attempt back and a fresh number is generated.
        let order = bounded_retry(self.unique_number_max_attempts, "order number", |_| {
            let db = self.db.clone();
            let item_rows = item_rows.clone();
            let address = address.clone();
            async move {
                let txn = db.begin().await.map_err(ServiceError::from_db)?;

                let order_row = order::ActiveModel {
                    id: Set(order_id),
                    order_number: Set(generate_order_number(company_id, now)),
                    company_id: Set(company_id),
                    placed_by: Set(placed_by),
                    status: Set(OrderStatus::Pending),
                    total_amount: Set(total),
                    approval_completed: Set(false),
                    shipping_name: Set(address.name),
                    shipping_company: Set(address.company),
                    shipping_postal_code: Set(address.postal_code),
                    shipping_prefecture: Set(address.prefecture),
                    shipping_city: Set(address.city),
                    shipping_address1: Set(address.address1),
                    shipping_address2: Set(address.address2),
                    shipping_phone: Set(address.phone),
                    cancel_reason: Set(None),
                    cancel_reject_reason: Set(None),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                    version: Set(1),
                };

                let inserted = match order_row.insert(&txn).await {
                    Ok(model) => model,
                    Err(e) if db::is_unique_violation(&e) => return Ok(Attempt::Collision),
                    Err(e) => return Err(ServiceError::from_db(e)),
                };

                for row in item_rows {
                    row.insert(&txn).await.map_err(ServiceError::from_db)?;
                }

                txn.commit().await.map_err(ServiceError::from_db)?;
                Ok(Attempt::Done(inserted))
            }
        })
        .await?;

        let items = self.get_order_items(order.id).await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "Order created successfully"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::OrderCreated(order.id)).await {
                warn!(error = %e, order_id = %order.id, "Failed to send order created event");
            }
        }

        Ok((order, items))
    }

    /// Retrieves an order by ID
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn find_order(&self, order_id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::from_db)
    }

    /// Retrieves an order by its human-readable order number
    #[instrument(skip(self))]
    pub async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await
            .map_err(ServiceError::from_db)
    }

    /// Lists an order's items in stable order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::from_db)
    }

    /// Lists orders with pagination, optionally scoped to one company.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        company_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = OrderEntity::find();
        if let Some(company_id) = company_id {
            query = query.filter(order::Column::CompanyId.eq(company_id));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await.map_err(ServiceError::from_db)?;
        let orders = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::from_db)?;

        Ok(OrderListResponse {
            orders: orders.into_iter().map(OrderResponse::from_model).collect(),
            total,
            page,
            per_page,
        })
    }
}

fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Order numbers: date stamp + owning-company fragment + random sequence,
/// e.g. `20250301-9F21A3-0042`. The random tail is regenerated on collision.
fn generate_order_number(company_id: Uuid, now: DateTime<Utc>) -> String {
    let company_fragment = company_id.simple().to_string()[..6].to_uppercase();
    let sequence: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{}-{}-{:04}", now.format("%Y%m%d"), company_fragment, sequence)
}
