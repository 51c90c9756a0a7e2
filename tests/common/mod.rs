#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use lubeline_api::{
    auth::Actor,
    config::AppConfig,
    entities::order::{self, OrderStatus},
    entities::product,
    events::{self, EventSender},
    migrator::Migrator,
    services::facade::OrderFacade,
    services::orders::{CreateOrderInput, DeliveryAddress, OrderItemInput},
    AppState,
};

/// Helper harness backed by an in-memory SQLite database.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub facade: OrderFacade,
    pub event_sender: EventSender,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1).min_connections(1);
        let db = Database::connect(options).await.expect("sqlite connection");
        Migrator::up(&db, None).await.expect("migrations");

        let db = Arc::new(db);
        let (tx, rx) = mpsc::channel(64);
        let event_task = tokio::spawn(events::process_events(rx));
        let event_sender = EventSender::new(tx);
        let facade = OrderFacade::new(db.clone(), Some(Arc::new(event_sender.clone())), 5);

        Self {
            db,
            facade,
            event_sender,
            _event_task: event_task,
        }
    }

    /// Builds the HTTP surface backed by this harness's state.
    pub fn router(&self) -> Router {
        let state = AppState {
            db: self.db.clone(),
            config: AppConfig::new("sqlite::memory:", "test"),
            event_sender: self.event_sender.clone(),
            facade: self.facade.clone(),
        };
        Router::new()
            .nest("/api/v1", lubeline_api::api_v1_routes())
            .with_state(state)
    }

    pub async fn seed_product(&self, sku: &str, name: &str, unit_price: Decimal) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            sku: Set(sku.to_string()),
            unit_price: Set(unit_price),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub fn delivery_address() -> DeliveryAddress {
        DeliveryAddress {
            name: "Taro Yamada".to_string(),
            company: "Yamada Kogyo".to_string(),
            postal_code: "100-0001".to_string(),
            prefecture: "Tokyo".to_string(),
            city: "Chiyoda-ku".to_string(),
            address1: "1-1-1 Chiyoda".to_string(),
            address2: None,
            phone: "03-1234-5678".to_string(),
        }
    }

    pub fn order_input(lines: &[(&product::Model, i32)]) -> CreateOrderInput {
        CreateOrderInput {
            items: lines
                .iter()
                .map(|(product, quantity)| OrderItemInput {
                    product_id: product.id,
                    quantity: *quantity,
                    unit_price: None,
                })
                .collect(),
            delivery_address: Self::delivery_address(),
            total_amount: None,
        }
    }

    /// Places an order via the facade with one line per (product, quantity).
    pub async fn place_order(
        &self,
        actor: &Actor,
        lines: &[(&product::Model, i32)],
    ) -> order::Model {
        let (order, _items) = self
            .facade
            .create_order(actor, None, Self::order_input(lines))
            .await
            .expect("order created");
        order
    }

    /// Walks an order forward along the fulfillment chain.
    pub async fn advance(&self, staff: &Actor, order_id: Uuid, stops: &[OrderStatus]) {
        for status in stops {
            self.facade
                .set_status(staff, order_id, *status)
                .await
                .expect("transition applied");
        }
    }
}

pub fn staff() -> Actor {
    Actor::staff(Uuid::new_v4(), Uuid::new_v4())
}

pub fn customer_of(company_id: Uuid) -> Actor {
    Actor::customer(Uuid::new_v4(), company_id)
}

/// Builds an HTTP request carrying the gateway identity headers.
pub fn http_request(
    method: Method,
    uri: &str,
    actor: Option<&Actor>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(actor) = actor {
        let role = if actor.is_staff() { "staff" } else { "customer" };
        builder = builder
            .header("x-actor-id", actor.user_id.to_string())
            .header("x-company-id", actor.company_id.to_string())
            .header("x-actor-role", role);
    }

    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
