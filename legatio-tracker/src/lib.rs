//! legatio-tracker library interface
//!
//! Upload queue orchestration and application progress tracking for the
//! visa portal, exposed for the binary and for integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod event_bridge;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use legatio_common::events::EventBus;
use services::{FlagStore, StatusPoller, UploadWorkerHandle};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Upload queue and worker
    pub uploads: UploadWorkerHandle,
    /// Status poller; owns the progress model and the published snapshot
    pub poller: StatusPoller,
    /// Persisted biometric/payment flags
    pub flags: Arc<dyn FlagStore>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Fires on shutdown; ends open SSE streams
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        uploads: UploadWorkerHandle,
        poller: StatusPoller,
        flags: Arc<dyn FlagStore>,
        event_bus: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            uploads,
            poller,
            flags,
            event_bus,
            shutdown,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::upload_routes())
        .merge(api::progress_routes())
        .merge(api::flag_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
        // Portal UI is served from another origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
