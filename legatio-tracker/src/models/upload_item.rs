//! Upload item state machine
//!
//! QUEUED → UPLOADING → COMPLETED
//!                    ↘ FAILED → (retry) QUEUED
//! Any non-terminal state → CANCELLED
//!
//! COMPLETED and CANCELLED are terminal.

use chrono::{DateTime, Utc};
use legatio_common::DocumentType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Upload item identifier
pub type UploadId = Uuid;

/// Upload lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Waiting for a capacity slot
    Queued,
    /// Transfer in flight, holds one capacity slot
    Uploading,
    /// Stored by the transport
    Completed,
    /// Transfer failed, waiting for a caller-initiated retry
    Failed,
    /// Removed from consideration by the caller
    Cancelled,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Cancelled)
    }

    /// Transitions reachable through `UploadQueueManager::transition`
    ///
    /// FAILED → QUEUED is deliberately absent: only `retry` may re-queue.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Queued, Uploading)
                | (Queued, Cancelled)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Uploading, Cancelled)
                | (Failed, Cancelled)
        )
    }
}

/// Reference to a file chosen by the applicant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Display name (original file name)
    pub name: String,
    /// Location the transport reads bytes from
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size_bytes,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Record returned by the document transport for a stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Storage-side document id
    pub id: String,
    pub name: String,
    pub document_type: DocumentType,
    pub verified: bool,
    pub uploaded_at: DateTime<Utc>,
}

/// One document moving through the upload queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadItem {
    pub id: UploadId,
    pub file: FileRef,
    pub document_type: DocumentType,
    pub status: UploadStatus,
    /// Transfer progress 0-100, None until the transport reports
    pub progress: Option<u8>,
    pub error: Option<String>,
    pub result: Option<TransferReceipt>,
    pub retry_count: u32,
    /// Thumbnail or data URL for display, never read by the core
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadItem {
    /// Create a queued item with a fresh id
    pub fn new(file: FileRef, document_type: DocumentType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file,
            document_type,
            status: UploadStatus::Queued,
            progress: None,
            error: None,
            result: None,
            retry_count: 0,
            preview: None,
            enqueued_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UploadStatus::Uploading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_is_queued() {
        let item = UploadItem::new(
            FileRef::new("passport.pdf", "/tmp/passport.pdf", 1024),
            DocumentType::Passport,
        );
        assert_eq!(item.status, UploadStatus::Queued);
        assert_eq!(item.retry_count, 0);
        assert!(item.progress.is_none());
        assert!(item.error.is_none());
        assert!(item.result.is_none());
        assert!(!item.is_active());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [UploadStatus::Completed, UploadStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                UploadStatus::Queued,
                UploadStatus::Uploading,
                UploadStatus::Completed,
                UploadStatus::Failed,
                UploadStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_failed_only_requeues_through_retry() {
        assert!(!UploadStatus::Failed.can_transition_to(UploadStatus::Queued));
        assert!(!UploadStatus::Failed.can_transition_to(UploadStatus::Uploading));
        assert!(UploadStatus::Failed.can_transition_to(UploadStatus::Cancelled));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&UploadStatus::Uploading).unwrap(), "\"uploading\"");
        assert_eq!(serde_json::to_string(&UploadStatus::Cancelled).unwrap(), "\"cancelled\"");
    }
}
