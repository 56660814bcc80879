//! Server-Sent Events stream of portal events

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /events - every PortalEvent on the bus, with heartbeat
///
/// Streams upload lifecycle events (`UploadQueued` through `QueueChanged`),
/// `SnapshotPublished` and `PollFailed`. Ends when the service shuts down.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    legatio_common::sse::portal_event_stream(
        &state.event_bus,
        state.shutdown.clone(),
        "legatio-tracker",
    )
}
