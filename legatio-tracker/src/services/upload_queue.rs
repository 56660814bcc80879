//! Upload queue state and concurrency budget
//!
//! Owns every [`UploadItem`] plus the active-transfer counter. All methods are
//! synchronous and in-memory; the worker serializes access through a
//! `tokio::sync::Mutex`.
//!
//! Invariant: `active_count <= max_concurrent_uploads`, and while the worker
//! drives the queue it equals the number of items in `uploading`.

use crate::models::{FileRef, TransferReceipt, UploadId, UploadItem, UploadStatus};
use chrono::Utc;
use legatio_common::events::QueueSummary;
use legatio_common::{DocumentType, Error, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Concurrency budget for the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    max_concurrent_uploads: usize,
}

impl QueueConfig {
    /// Rejects a zero budget, which would stall the queue forever
    pub fn new(max_concurrent_uploads: usize) -> Result<Self> {
        if max_concurrent_uploads == 0 {
            return Err(Error::Config(
                "max_concurrent_uploads must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            max_concurrent_uploads,
        })
    }

    pub fn max_concurrent_uploads(&self) -> usize {
        self.max_concurrent_uploads
    }
}

/// Upload queue manager
pub struct UploadQueueManager {
    config: QueueConfig,
    items: HashMap<UploadId, UploadItem>,
    /// Enqueue order; retried items keep their slot
    order: Vec<UploadId>,
    active_count: usize,
}

impl UploadQueueManager {
    /// Empty queue with zero active transfers
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            items: HashMap::new(),
            order: Vec::new(),
            active_count: 0,
        }
    }

    pub fn config(&self) -> QueueConfig {
        self.config
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add a file to the queue; never blocks
    pub fn enqueue(&mut self, file: FileRef, document_type: DocumentType) -> UploadId {
        let item = UploadItem::new(file, document_type);
        let id = item.id;
        debug!(upload_id = %id, file = %item.file.name, %document_type, "Upload enqueued");
        self.order.push(id);
        self.items.insert(id, item);
        id
    }

    pub fn get(&self, id: UploadId) -> Option<&UploadItem> {
        self.items.get(&id)
    }

    /// Items in enqueue order
    pub fn items(&self) -> impl Iterator<Item = &UploadItem> + '_ {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    /// Move an item along the upload state machine
    ///
    /// Returns false (and leaves the item untouched) for unknown ids and for
    /// transitions the state machine does not allow. Does not touch
    /// `active_count`; the worker accounts for slots itself.
    pub fn transition(
        &mut self,
        id: UploadId,
        status: UploadStatus,
        error: Option<String>,
    ) -> bool {
        let Some(item) = self.items.get_mut(&id) else {
            warn!(upload_id = %id, ?status, "Transition on unknown upload ignored");
            return false;
        };

        if !item.status.can_transition_to(status) {
            warn!(
                upload_id = %id,
                from = ?item.status,
                to = ?status,
                "Invalid upload transition ignored"
            );
            return false;
        }

        match status {
            UploadStatus::Uploading => {
                item.progress = Some(0);
                item.error = None;
            }
            UploadStatus::Completed => {
                item.progress = Some(100);
                item.error = None;
            }
            UploadStatus::Failed => {
                item.error = Some(error.unwrap_or_else(|| "upload failed".to_string()));
            }
            UploadStatus::Cancelled | UploadStatus::Queued => {
                if error.is_some() {
                    item.error = error;
                }
            }
        }

        item.status = status;
        item.updated_at = Utc::now();
        true
    }

    /// Record transfer progress for an uploading item, clamped to 0..=100
    pub fn set_progress(&mut self, id: UploadId, progress: u8) -> bool {
        match self.items.get_mut(&id) {
            Some(item) if item.status == UploadStatus::Uploading => {
                item.progress = Some(progress.min(100));
                item.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Attach the transport receipt to an uploading item
    pub fn set_result(&mut self, id: UploadId, result: TransferReceipt) -> bool {
        match self.items.get_mut(&id) {
            Some(item) if item.status == UploadStatus::Uploading => {
                item.result = Some(result);
                item.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Attach a display preview (thumbnail or data URL)
    pub fn set_preview(&mut self, id: UploadId, preview: String) -> bool {
        match self.items.get_mut(&id) {
            Some(item) => {
                item.preview = Some(preview);
                true
            }
            None => false,
        }
    }

    /// Re-queue a failed item
    ///
    /// Only `failed` items are eligible; anything else is a no-op returning
    /// false.
    pub fn retry(&mut self, id: UploadId) -> bool {
        let Some(item) = self.items.get_mut(&id) else {
            warn!(upload_id = %id, "Retry on unknown upload ignored");
            return false;
        };

        if item.status != UploadStatus::Failed {
            warn!(upload_id = %id, status = ?item.status, "Retry ignored, upload is not failed");
            return false;
        }

        item.status = UploadStatus::Queued;
        item.retry_count += 1;
        item.error = None;
        item.progress = None;
        item.updated_at = Utc::now();
        debug!(upload_id = %id, retry_count = item.retry_count, "Upload re-queued");
        true
    }

    /// Remove an item that is not holding a capacity slot
    ///
    /// Uploading items must be cancelled first; those return None.
    pub fn remove(&mut self, id: UploadId) -> Option<UploadItem> {
        if self.items.get(&id)?.status == UploadStatus::Uploading {
            warn!(upload_id = %id, "Refusing to remove an upload in flight");
            return None;
        }
        self.order.retain(|other| *other != id);
        self.items.remove(&id)
    }

    /// Sweep completed items, returning how many were removed
    pub fn clear_completed(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| item.status != UploadStatus::Completed);
        let items = &self.items;
        self.order.retain(|id| items.contains_key(id));
        before - self.items.len()
    }

    /// Teardown: drop every item and release every slot
    pub fn clear_all(&mut self) {
        self.items.clear();
        self.order.clear();
        self.active_count = 0;
    }

    pub fn can_start_new_upload(&self) -> bool {
        self.active_count < self.config.max_concurrent_uploads
    }

    pub fn increment_active_uploads(&mut self) {
        debug_assert!(
            self.active_count < self.config.max_concurrent_uploads,
            "active upload count would exceed the concurrency budget"
        );
        self.active_count = (self.active_count + 1).min(self.config.max_concurrent_uploads);
    }

    /// Release one slot; clamps at zero
    pub fn decrement_active_uploads(&mut self) {
        if self.active_count == 0 {
            warn!("Active upload count already zero, decrement ignored");
            return;
        }
        self.active_count -= 1;
    }

    /// Earliest-enqueued item still waiting for a slot
    pub fn next_queued(&self) -> Option<UploadId> {
        self.order.iter().copied().find(|id| {
            self.items
                .get(id)
                .map(|item| item.status == UploadStatus::Queued)
                .unwrap_or(false)
        })
    }

    pub fn summary(&self) -> QueueSummary {
        let mut summary = QueueSummary {
            active: self.active_count,
            max_concurrent: self.config.max_concurrent_uploads,
            ..QueueSummary::default()
        };
        for item in self.items.values() {
            match item.status {
                UploadStatus::Queued => summary.queued += 1,
                UploadStatus::Uploading => summary.uploading += 1,
                UploadStatus::Completed => summary.completed += 1,
                UploadStatus::Failed => summary.failed += 1,
                UploadStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}
