//! Applicant completion flags endpoint
//!
//! Stands in for the biometric appointment and fee payment services: setting
//! a flag here is how the demo records that either step happened.

use crate::models::FlagName;
use crate::services::PublishedSnapshot;
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Request payload for setting a flag
#[derive(Debug, Deserialize)]
pub struct SetFlagRequest {
    pub value: bool,
}

/// Response payload for a stored flag
#[derive(Debug, Serialize)]
pub struct SetFlagResponse {
    pub flag: FlagName,
    pub value: bool,
    pub published: PublishedSnapshot,
}

/// POST /flags/:flag handler
///
/// **Request:** `{"value": true}`
///
/// **Behavior:**
/// 1. Persist the flag (authoritative)
/// 2. Apply it to the progress model and republish the snapshot
///
/// **Errors:**
/// - 400 Bad Request: unknown flag name
/// - 500 Internal Server Error: flag store write failure
pub async fn set_flag(
    State(state): State<AppState>,
    Path(flag): Path<String>,
    Json(payload): Json<SetFlagRequest>,
) -> ApiResult<Json<SetFlagResponse>> {
    let flag: FlagName = flag.parse()?;
    let application_id = state.poller.current().application_id;

    if let Err(e) = state.flags.set(&application_id, flag, payload.value).await {
        error!(%application_id, %flag, error = %e, "Failed to store flag");
        *state.last_error.write().await = Some(e.to_string());
        return Err(ApiError::Internal(format!("Failed to store flag: {}", e)));
    }

    {
        let shared = state.poller.model();
        let mut model = shared.write().await;
        match flag {
            FlagName::BiometricDone => model.set_biometric_done(payload.value),
            FlagName::PaymentDone => model.set_payment_done(payload.value),
        }
    }
    state.poller.republish().await;
    info!(%application_id, %flag, value = payload.value, "Flag set");

    Ok(Json(SetFlagResponse {
        flag,
        value: payload.value,
        published: state.poller.current(),
    }))
}

/// Build flag routes
pub fn flag_routes() -> Router<AppState> {
    Router::new().route("/flags/:flag", post(set_flag))
}
