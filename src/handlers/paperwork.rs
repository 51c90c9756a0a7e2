use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Actor,
    entities::paperwork::{self, PaperworkType},
    errors::ServiceError,
    services::paperwork::RenderedPaperwork,
    ApiResponse, ApiResult, AppState,
};

fn map_doc_type_str(doc_type: &str) -> Result<PaperworkType, ServiceError> {
    match doc_type.to_ascii_lowercase().as_str() {
        "delivery_note" => Ok(PaperworkType::DeliveryNote),
        "receipt" => Ok(PaperworkType::Receipt),
        other => Err(ServiceError::ValidationError(format!(
            "Unknown document type: {other}"
        ))),
    }
}

// Paperwork DTOs

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreatePaperworkRequest {
    pub doc_type: String,
    /// Defaults to today when omitted.
    pub delivery_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RenderPaperworkResponse {
    pub document: RenderedPaperwork,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct RenderQuery {
    /// `text` for a plain-text download; anything else returns JSON.
    pub format: Option<String>,
}

// Handlers

pub async fn create_paperwork(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<CreatePaperworkRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let doc_type = map_doc_type_str(&payload.doc_type)?;

    let document = state
        .facade
        .create_document(&actor, order_id, doc_type, payload.delivery_date)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(document))))
}

pub async fn list_paperwork(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Vec<paperwork::Model>> {
    let documents = state.facade.list_documents(&actor, order_id).await?;
    Ok(Json(ApiResponse::success(documents)))
}

pub async fn get_paperwork(
    State(state): State<AppState>,
    actor: Actor,
    Path((order_id, document_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<paperwork::Model> {
    let document = state
        .facade
        .get_document(&actor, order_id, document_id)
        .await?;
    Ok(Json(ApiResponse::success(document)))
}

pub async fn finalize_paperwork(
    State(state): State<AppState>,
    actor: Actor,
    Path((order_id, document_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<paperwork::Model> {
    let document = state
        .facade
        .finalize_document(&actor, order_id, document_id)
        .await?;
    Ok(Json(ApiResponse::success(document)))
}

pub async fn approve_paperwork(
    State(state): State<AppState>,
    actor: Actor,
    Path((order_id, document_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<paperwork::Model> {
    let document = state
        .facade
        .approve_document(&actor, order_id, document_id)
        .await?;
    Ok(Json(ApiResponse::success(document)))
}

pub async fn render_paperwork(
    State(state): State<AppState>,
    actor: Actor,
    Path((order_id, document_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<RenderQuery>,
) -> Result<Response, ServiceError> {
    let rendered = state
        .facade
        .render_document(&actor, order_id, document_id)
        .await?;

    if query.format.as_deref() == Some("text") {
        return Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            rendered.to_plain_text(),
        )
            .into_response());
    }

    let text = rendered.to_plain_text();
    Ok(Json(ApiResponse::success(RenderPaperworkResponse {
        document: rendered,
        text,
    }))
    .into_response())
}
