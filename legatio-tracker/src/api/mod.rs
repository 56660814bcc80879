//! HTTP API handlers for legatio-tracker
//!
//! JSON endpoints over the upload queue and the published snapshot, plus an
//! SSE stream of portal events.

pub mod flags;
pub mod health;
pub mod progress;
pub mod sse;
pub mod uploads;

pub use flags::flag_routes;
pub use health::health_routes;
pub use progress::progress_routes;
pub use sse::event_stream;
pub use uploads::upload_routes;
