use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Actor,
    entities::order::OrderStatus,
    errors::ServiceError,
    services::order_status::SkippedOrder,
    services::orders::{
        CreateOrderInput, DeliveryAddress, OrderItemInput, OrderItemResponse, OrderResponse,
    },
    ApiResponse, ApiResult, AppState, ListQuery,
};

/// Parses a status literal at the API edge; unknown literals never reach the
/// state machine.
fn map_status_str(status: &str) -> Result<OrderStatus, ServiceError> {
    match status.to_ascii_lowercase().as_str() {
        "pending" => Ok(OrderStatus::Pending),
        "confirmed" => Ok(OrderStatus::Confirmed),
        "processing" => Ok(OrderStatus::Processing),
        "shipped" => Ok(OrderStatus::Shipped),
        "partially_delivered" => Ok(OrderStatus::PartiallyDelivered),
        "delivered" => Ok(OrderStatus::Delivered),
        "cancel_requested" => Ok(OrderStatus::CancelRequested),
        "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
        "cancel_rejected" => Ok(OrderStatus::CancelRejected),
        other => Err(ServiceError::InvalidStatus(format!(
            "Unknown order status: {other}"
        ))),
    }
}

// Order DTOs

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    /// Staff may order on behalf of another company; customers may omit this
    /// or pass their own company id.
    pub company_id: Option<Uuid>,
    pub items: Vec<OrderItemInput>,
    pub delivery_address: DeliveryAddress,
    pub total_amount: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    #[validate(length(min = 1, message = "Status is required"))]
    pub status: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BulkStatusUpdateRequest {
    #[validate(length(min = 1, message = "At least one order id is required"))]
    pub order_ids: Vec<Uuid>,
    #[validate(length(min = 1, message = "Status is required"))]
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkStatusUpdateResponse {
    pub updated_count: usize,
    pub skipped_count: usize,
    pub updated: Vec<Uuid>,
    pub skipped: Vec<SkippedOrder>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CancellationRequestBody {
    #[validate(length(
        min = 1,
        max = 500,
        message = "Reason must be between 1 and 500 characters"
    ))]
    pub reason: String,
}

// Handlers

pub async fn create_order(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let input = CreateOrderInput {
        items: payload.items,
        delivery_address: payload.delivery_address,
        total_amount: payload.total_amount,
    };

    let (order, items) = state
        .facade
        .create_order(&actor, payload.company_id, input)
        .await?;

    let body = CreateOrderResponse {
        order: OrderResponse::from_model(order),
        items: items.into_iter().map(OrderItemResponse::from).collect(),
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::success(body))))
}

pub async fn list_orders(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> ApiResult<crate::services::orders::OrderListResponse> {
    let list = state
        .facade
        .list_orders(&actor, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(list)))
}

pub async fn get_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state.facade.get_order(&actor, order_id).await?;
    Ok(Json(ApiResponse::success(OrderResponse::from_model(order))))
}

pub async fn get_order_by_number(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_number): Path<String>,
) -> ApiResult<OrderResponse> {
    let order = state
        .facade
        .get_order_by_number(&actor, &order_number)
        .await?;
    Ok(Json(ApiResponse::success(OrderResponse::from_model(order))))
}

pub async fn get_order_items(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Vec<OrderItemResponse>> {
    let items = state.facade.get_order_items(&actor, order_id).await?;
    Ok(Json(ApiResponse::success(
        items.into_iter().map(OrderItemResponse::from).collect(),
    )))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderResponse> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    let new_status = map_status_str(&payload.status)?;

    let order = state.facade.set_status(&actor, order_id, new_status).await?;
    Ok(Json(ApiResponse::success(OrderResponse::from_model(order))))
}

pub async fn bulk_update_order_status(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<BulkStatusUpdateRequest>,
) -> ApiResult<BulkStatusUpdateResponse> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    let new_status = map_status_str(&payload.status)?;

    let outcome = state
        .facade
        .bulk_set_status(&actor, payload.order_ids, new_status)
        .await?;

    Ok(Json(ApiResponse::success(BulkStatusUpdateResponse {
        updated_count: outcome.updated_count(),
        skipped_count: outcome.skipped_count(),
        updated: outcome.updated,
        skipped: outcome.skipped,
    })))
}

pub async fn request_cancellation(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<CancellationRequestBody>,
) -> ApiResult<OrderResponse> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let order = state
        .facade
        .request_cancellation(&actor, order_id, &payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(OrderResponse::from_model(order))))
}

pub async fn approve_cancellation(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state.facade.approve_cancellation(&actor, order_id).await?;
    Ok(Json(ApiResponse::success(OrderResponse::from_model(order))))
}

pub async fn reject_cancellation(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<CancellationRequestBody>,
) -> ApiResult<OrderResponse> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let order = state
        .facade
        .reject_cancellation(&actor, order_id, &payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(OrderResponse::from_model(order))))
}
