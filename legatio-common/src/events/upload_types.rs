//! Upload queue type definitions
//!
//! Supporting types for upload queue progress reporting.

use serde::{Deserialize, Serialize};

/// Per-status item counts plus the number of transfers holding a slot
///
/// `active` tracks the concurrency budget and should equal `uploading`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub queued: usize,
    pub uploading: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub active: usize,
    pub max_concurrent: usize,
}

impl QueueSummary {
    /// Total number of items held by the queue
    pub fn total(&self) -> usize {
        self.queued + self.uploading + self.completed + self.failed + self.cancelled
    }

    /// True when nothing is waiting or in flight
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.uploading == 0
    }
}
