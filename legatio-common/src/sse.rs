//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementations for Legatio services.

use crate::events::{EventBus, PortalEvent};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Heartbeat period for idle SSE connections
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert a bus event into an SSE frame
///
/// Returns None if the event cannot be serialized.
pub fn to_sse_event(event: &PortalEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e);
            None
        }
    }
}

/// Stream every PortalEvent on the bus to one SSE client
///
/// Sends a `ConnectionStatus` frame first so clients can show a connected
/// indicator before the first domain event arrives. Lagging clients skip
/// the events they missed. The stream ends when `shutdown` fires or the bus
/// closes, so open connections never hold up a graceful shutdown.
///
/// # Example
/// ```rust,ignore
/// pub async fn event_stream(
///     State(state): State<AppState>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     legatio_common::sse::portal_event_stream(
///         &state.event_bus,
///         state.shutdown.clone(),
///         "legatio-tracker",
///     )
/// }
/// ```
pub fn portal_event_stream(
    event_bus: &EventBus,
    shutdown: CancellationToken,
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} events", service_name);

    Sse::new(portal_events(event_bus, shutdown, service_name)).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}

/// Frames behind [`portal_event_stream`], without the SSE response wrapper
pub fn portal_events(
    event_bus: &EventBus,
    shutdown: CancellationToken,
    service_name: &'static str,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let mut rx = event_bus.subscribe();

    async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("SSE: shutdown, ending {} stream", service_name);
                    break;
                }
                received = rx.recv() => received,
            };

            match received {
                Ok(event) => {
                    if let Some(frame) = to_sse_event(&event) {
                        debug!("SSE: Broadcasting {}", event.event_type());
                        yield Ok(frame);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: {} client lagged, skipped {} events", service_name, skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("SSE: event bus closed, ending {} stream", service_name);
                    break;
                }
            }
        }
    }
}
