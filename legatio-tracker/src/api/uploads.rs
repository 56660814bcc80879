//! Upload queue endpoints
//!
//! Every route goes through the worker handle, so queue mutations and slot
//! accounting stay in one place.

use crate::models::{FileRef, UploadId, UploadItem, UploadStatus};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use legatio_common::events::QueueSummary;
use legatio_common::DocumentType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Queue listing
#[derive(Debug, Serialize)]
pub struct UploadListResponse {
    /// Items in enqueue order
    pub items: Vec<UploadItem>,
    pub summary: QueueSummary,
}

/// Request payload for queueing a document
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub file_name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Wire name, e.g. "passport" or "bank_statement"
    pub document_type: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub upload_id: UploadId,
    pub status: UploadStatus,
}

/// Status of one item after an action
#[derive(Debug, Serialize)]
pub struct UploadActionResponse {
    pub upload_id: UploadId,
    pub status: UploadStatus,
    pub retry_count: u32,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

/// GET /uploads
pub async fn list_uploads(State(state): State<AppState>) -> Json<UploadListResponse> {
    Json(UploadListResponse {
        items: state.uploads.items().await,
        summary: state.uploads.summary().await,
    })
}

/// POST /uploads
///
/// **Request:** `{"file_name": "passport.pdf", "path": "/data/passport.pdf",
/// "size_bytes": 48213, "document_type": "passport"}`
///
/// **Errors:**
/// - 400 Bad Request: empty file name or unknown document type
pub async fn enqueue_upload(
    State(state): State<AppState>,
    Json(payload): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<EnqueueResponse>)> {
    if payload.file_name.trim().is_empty() {
        return Err(ApiError::BadRequest("file_name cannot be empty".to_string()));
    }
    let document_type: DocumentType = payload.document_type.parse()?;

    let mut file = FileRef::new(payload.file_name, payload.path, payload.size_bytes);
    if let Some(mime_type) = payload.mime_type {
        file = file.with_mime_type(mime_type);
    }

    let upload_id = state.uploads.enqueue(file, document_type).await;
    info!(upload_id = %upload_id, %document_type, "Upload queued via API");

    Ok((
        StatusCode::CREATED,
        Json(EnqueueResponse {
            upload_id,
            status: UploadStatus::Queued,
        }),
    ))
}

/// POST /uploads/:id/retry
///
/// **Errors:**
/// - 404 Not Found: unknown upload
/// - 409 Conflict: upload is not in `failed`
pub async fn retry_upload(
    State(state): State<AppState>,
    Path(id): Path<UploadId>,
) -> ApiResult<Json<UploadActionResponse>> {
    let item = find(&state, id).await?;
    if !state.uploads.retry(id).await {
        return Err(ApiError::Conflict(format!(
            "Upload {} is {:?}; only failed uploads can be retried",
            id, item.status
        )));
    }
    action_response(&state, id).await
}

/// POST /uploads/:id/cancel
///
/// Cancelling an upload in flight is a request; the item settles as
/// `cancelled` once the transfer stops.
///
/// **Errors:**
/// - 404 Not Found: unknown upload
/// - 409 Conflict: upload already completed or cancelled
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(id): Path<UploadId>,
) -> ApiResult<Json<UploadActionResponse>> {
    let item = find(&state, id).await?;
    if !state.uploads.cancel(id).await {
        return Err(ApiError::Conflict(format!(
            "Upload {} is {:?} and cannot be cancelled",
            id, item.status
        )));
    }
    action_response(&state, id).await
}

/// DELETE /uploads/:id
///
/// **Errors:**
/// - 404 Not Found: unknown upload
/// - 409 Conflict: upload in flight (cancel it first)
pub async fn remove_upload(
    State(state): State<AppState>,
    Path(id): Path<UploadId>,
) -> ApiResult<Json<UploadItem>> {
    find(&state, id).await?;
    match state.uploads.remove(id).await {
        Some(item) => Ok(Json(item)),
        None => Err(ApiError::Conflict(format!(
            "Upload {} is in flight; cancel it before removing",
            id
        ))),
    }
}

/// DELETE /uploads/completed
pub async fn clear_completed(State(state): State<AppState>) -> Json<ClearResponse> {
    Json(ClearResponse {
        cleared: state.uploads.clear_completed().await,
    })
}

/// DELETE /uploads
///
/// Drops every item and abandons transfers in flight.
pub async fn clear_all(State(state): State<AppState>) -> Json<ClearResponse> {
    let cleared = state.uploads.summary().await.total();
    state.uploads.clear_all().await;
    Json(ClearResponse { cleared })
}

async fn find(state: &AppState, id: UploadId) -> ApiResult<UploadItem> {
    state
        .uploads
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Upload {}", id)))
}

async fn action_response(state: &AppState, id: UploadId) -> ApiResult<Json<UploadActionResponse>> {
    let item = find(state, id).await?;
    Ok(Json(UploadActionResponse {
        upload_id: id,
        status: item.status,
        retry_count: item.retry_count,
    }))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/uploads", get(list_uploads).post(enqueue_upload).delete(clear_all))
        .route("/uploads/completed", delete(clear_completed))
        .route("/uploads/:id", delete(remove_upload))
        .route("/uploads/:id/retry", post(retry_upload))
        .route("/uploads/:id/cancel", post(cancel_upload))
}
