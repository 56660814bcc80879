//! Event types for the Legatio event system
//!
//! Provides shared event definitions and EventBus for all Legatio crates.

mod upload_types;

pub use upload_types::QueueSummary;

use crate::visa::DocumentType;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Legatio event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PortalEvent {
    /// Document accepted into the upload queue
    UploadQueued {
        upload_id: Uuid,
        file_name: String,
        document_type: DocumentType,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Worker took a capacity slot and handed the file to the transport
    UploadStarted {
        upload_id: Uuid,
        /// Number of retries preceding this attempt
        retry_count: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transfer progress (0-100)
    ///
    /// High frequency; emitted lossy.
    UploadProgress {
        upload_id: Uuid,
        percent: u8,
    },

    /// Transfer finished and the document was stored
    ///
    /// Triggers:
    /// - Event bridge: feed the progress model's document signal
    /// - SSE: update upload list
    UploadCompleted {
        upload_id: Uuid,
        document_type: DocumentType,
        /// Whether the storage service verified the document on receipt
        verified: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transfer failed; the item waits for a caller-initiated retry
    UploadFailed {
        upload_id: Uuid,
        error: String,
        retry_count: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Item cancelled (queued or in flight)
    UploadCancelled {
        upload_id: Uuid,
        /// True if the item held a capacity slot when cancelled
        was_active: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue composition changed
    QueueChanged {
        summary: QueueSummary,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Status poller published a new pipeline snapshot
    SnapshotPublished {
        application_id: String,
        sequence: u64,
        progress_percent: u8,
        /// Id of the current stage, None once every stage is complete
        current_stage: Option<String>,
        /// True if the current stage is waiting on the applicant
        blocked: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A poll failed; the previous snapshot stays published
    PollFailed {
        application_id: String,
        sequence: u64,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PortalEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            PortalEvent::UploadQueued { .. } => "UploadQueued",
            PortalEvent::UploadStarted { .. } => "UploadStarted",
            PortalEvent::UploadProgress { .. } => "UploadProgress",
            PortalEvent::UploadCompleted { .. } => "UploadCompleted",
            PortalEvent::UploadFailed { .. } => "UploadFailed",
            PortalEvent::UploadCancelled { .. } => "UploadCancelled",
            PortalEvent::QueueChanged { .. } => "QueueChanged",
            PortalEvent::SnapshotPublished { .. } => "SnapshotPublished",
            PortalEvent::PollFailed { .. } => "PollFailed",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper around `tokio::sync::broadcast`. Cloning shares the channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PortalEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    ///
    /// # Examples
    ///
    /// ```
    /// use legatio_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PortalEvent,
    ) -> Result<usize, broadcast::error::SendError<PortalEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// ```
    /// use legatio_common::events::{EventBus, PortalEvent};
    /// use uuid::Uuid;
    ///
    /// let event_bus = EventBus::new(16);
    /// event_bus.emit_lossy(PortalEvent::UploadProgress {
    ///     upload_id: Uuid::new_v4(),
    ///     percent: 40,
    /// });
    /// ```
    pub fn emit_lossy(&self, event: PortalEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
