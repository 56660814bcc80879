//! Transport whose transfers finish only when the test says so

use async_trait::async_trait;
use chrono::Utc;
use legatio_tracker::models::TransferReceipt;
use legatio_tracker::services::{
    DocumentTransport, ProgressReporter, TransferError, TransferRequest,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Outcome the test hands to a pending transfer: Ok(verified) or Err(message)
pub type Completion = Result<bool, String>;

#[derive(Default)]
pub struct ManualTransport {
    pending: Mutex<HashMap<String, oneshot::Sender<Completion>>>,
    reporters: Mutex<HashMap<String, ProgressReporter>>,
    started: AtomicUsize,
}

impl ManualTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// True once the transfer for `file_name` is waiting for completion
    pub fn is_pending(&self, file_name: &str) -> bool {
        self.pending.lock().unwrap().contains_key(file_name)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Total transfer calls so far
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Reporter handed to the latest attempt for `file_name`
    pub fn reporter(&self, file_name: &str) -> Option<ProgressReporter> {
        self.reporters.lock().unwrap().get(file_name).cloned()
    }

    /// Finish a pending transfer; false if none is waiting under that name
    pub fn finish(&self, file_name: &str, completion: Completion) -> bool {
        let sender = self.pending.lock().unwrap().remove(file_name);
        match sender {
            Some(tx) => tx.send(completion).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl DocumentTransport for ManualTransport {
    async fn transfer(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<TransferReceipt, TransferError> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(request.file.name.clone(), tx);
        self.reporters
            .lock()
            .unwrap()
            .insert(request.file.name.clone(), progress.clone());
        self.started.fetch_add(1, Ordering::SeqCst);
        progress.report(10);

        let completion = tokio::select! {
            _ = cancel.cancelled() => {
                self.pending.lock().unwrap().remove(&request.file.name);
                return Err(TransferError::Cancelled);
            }
            completion = rx => completion,
        };

        match completion {
            Ok(Ok(verified)) => Ok(TransferReceipt {
                id: format!("doc-{}", request.upload_id),
                name: request.file.name,
                document_type: request.document_type,
                verified,
                uploaded_at: Utc::now(),
            }),
            Ok(Err(message)) => Err(TransferError::Rejected(message)),
            Err(_) => Err(TransferError::Cancelled),
        }
    }
}
