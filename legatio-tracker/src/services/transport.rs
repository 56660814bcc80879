//! Document transport seam
//!
//! The worker hands each file to a [`DocumentTransport`] and never touches
//! bytes itself. [`SimulatedTransport`] stands in for the storage and
//! verification service in the demo binary.

use crate::models::{FileRef, TransferReceipt, UploadId};
use async_trait::async_trait;
use chrono::Utc;
use legatio_common::DocumentType;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Transfer failure, recorded on the upload item
#[derive(Debug, Error)]
pub enum TransferError {
    /// Storage service refused the document
    #[error("{0}")]
    Rejected(String),

    #[error("transfer timed out after {0}s")]
    TimedOut(u64),

    #[error("transfer cancelled")]
    Cancelled,
}

/// One document handed to the transport
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub upload_id: UploadId,
    pub file: FileRef,
    pub document_type: DocumentType,
}

/// One progress report, tagged with the attempt that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressReport {
    pub upload_id: UploadId,
    /// `retry_count` of the item when the attempt started
    pub attempt: u32,
    pub percent: u8,
}

/// Progress sink handed to a transport for one transfer
///
/// Reports are forwarded to the worker, which applies them to the queue
/// only while the same attempt is still running.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    upload_id: UploadId,
    attempt: u32,
    tx: mpsc::UnboundedSender<ProgressReport>,
}

impl ProgressReporter {
    pub fn new(
        upload_id: UploadId,
        attempt: u32,
        tx: mpsc::UnboundedSender<ProgressReport>,
    ) -> Self {
        Self {
            upload_id,
            attempt,
            tx,
        }
    }

    pub fn upload_id(&self) -> UploadId {
        self.upload_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Report percent complete; dropped silently once the worker is gone
    pub fn report(&self, percent: u8) {
        let _ = self.tx.send(ProgressReport {
            upload_id: self.upload_id,
            attempt: self.attempt,
            percent: percent.min(100),
        });
    }
}

/// External collaborator that moves one document's bytes
#[async_trait]
pub trait DocumentTransport: Send + Sync {
    /// Transfer one document
    ///
    /// Implementations should stop early once `cancel` fires; the worker
    /// races the call against the token either way.
    async fn transfer(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<TransferReceipt, TransferError>;
}

/// Demo transport: sleeps in steps, reports progress, fails at random
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    step_delay: Duration,
    steps: u8,
    failure_rate: f64,
    verify_on_receipt: bool,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(250),
            steps: 10,
            failure_rate: 0.1,
            verify_on_receipt: true,
        }
    }
}

impl SimulatedTransport {
    pub fn new(step_delay: Duration, steps: u8) -> Self {
        Self {
            step_delay,
            steps: steps.max(1),
            ..Self::default()
        }
    }

    /// Probability in 0.0..=1.0 that a transfer is rejected
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_verification(mut self, verify_on_receipt: bool) -> Self {
        self.verify_on_receipt = verify_on_receipt;
        self
    }
}

#[async_trait]
impl DocumentTransport for SimulatedTransport {
    async fn transfer(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<TransferReceipt, TransferError> {
        debug!(
            upload_id = %request.upload_id,
            file = %request.file.name,
            size_bytes = request.file.size_bytes,
            "Simulated transfer started"
        );

        for step in 1..=self.steps {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(self.step_delay) => {}
            }
            let percent = (step as u32 * 100 / self.steps as u32) as u8;
            progress.report(percent);
        }

        let rejected = rand::thread_rng().gen_bool(self.failure_rate);
        if rejected {
            return Err(TransferError::Rejected(format!(
                "storage service rejected {}",
                request.file.name
            )));
        }

        Ok(TransferReceipt {
            id: format!("doc-{}", uuid::Uuid::new_v4().simple()),
            name: request.file.name,
            document_type: request.document_type,
            verified: self.verify_on_receipt,
            uploaded_at: Utc::now(),
        })
    }
}
