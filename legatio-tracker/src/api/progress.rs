//! Application progress endpoints

use crate::services::{PollOutcome, PublishedSnapshot};
use crate::{ApiResult, AppState};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

/// Response for an on-demand refresh
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub outcome: PollOutcome,
    /// Snapshot published after the attempt (unchanged unless applied)
    pub published: PublishedSnapshot,
}

/// GET /progress
///
/// Latest published snapshot: per-stage flags, progress percent, available
/// actions and estimated processing days.
pub async fn get_progress(State(state): State<AppState>) -> Json<PublishedSnapshot> {
    Json(state.poller.current())
}

/// POST /progress/refresh
///
/// Polls the providers now. Returns `skipped` if a poll is already running
/// and `stopped` once polling has been shut down.
pub async fn refresh_progress(State(state): State<AppState>) -> ApiResult<Json<RefreshResponse>> {
    let outcome = state.poller.refresh_now().await;
    info!(?outcome, "On-demand progress refresh");

    Ok(Json(RefreshResponse {
        outcome,
        published: state.poller.current(),
    }))
}

/// Build progress routes
pub fn progress_routes() -> Router<AppState> {
    Router::new()
        .route("/progress", get(get_progress))
        .route("/progress/refresh", post(refresh_progress))
}
