//! Bounded-parallel upload worker
//!
//! A single task owns every in-flight transfer in a `FuturesUnordered` and
//! keeps it filled up to the queue's concurrency budget. Each completion is
//! settled and the freed slot refilled inside the same critical section, so
//! the active set never idles below capacity while queued work remains.
//!
//! Callers talk to the worker through [`UploadWorkerHandle`]; queue mutations
//! happen under the shared mutex and the worker is woken over a command
//! channel.

use crate::models::{FileRef, TransferReceipt, UploadId, UploadItem, UploadStatus};
use crate::services::transport::{
    DocumentTransport, ProgressReport, ProgressReporter, TransferError, TransferRequest,
};
use crate::services::upload_queue::UploadQueueManager;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use legatio_common::events::{EventBus, PortalEvent, QueueSummary};
use legatio_common::DocumentType;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Commands sent from handles to the worker task
#[derive(Debug)]
enum WorkerCommand {
    /// Queue changed; start whatever fits
    Wake,
    /// Cancel one in-flight transfer
    Cancel(UploadId),
    /// Cancel every in-flight transfer (queue teardown)
    CancelAll,
}

/// How a transfer settled
#[derive(Debug)]
enum TransferOutcome {
    Completed(TransferReceipt),
    Failed(String),
    Cancelled,
}

/// A finished upload, delivered to the completion sink without loss
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCompletion {
    pub upload_id: UploadId,
    pub receipt: TransferReceipt,
}

type InFlight = FuturesUnordered<BoxFuture<'static, (UploadId, TransferOutcome)>>;

/// Worker tuning
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadWorkerConfig {
    /// Per-transfer limit; elapsed transfers settle as failed
    pub transfer_timeout: Option<Duration>,
}

/// Caller surface over the shared upload queue
#[derive(Clone)]
pub struct UploadWorkerHandle {
    queue: Arc<Mutex<UploadQueueManager>>,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    event_bus: EventBus,
}

impl UploadWorkerHandle {
    /// Queue a file and wake the worker
    pub async fn enqueue(&self, file: FileRef, document_type: DocumentType) -> UploadId {
        let file_name = file.name.clone();
        let (id, summary) = {
            let mut queue = self.queue.lock().await;
            let id = queue.enqueue(file, document_type);
            (id, queue.summary())
        };

        self.event_bus.emit_lossy(PortalEvent::UploadQueued {
            upload_id: id,
            file_name,
            document_type,
            timestamp: Utc::now(),
        });
        self.queue_changed(summary);
        self.wake();
        id
    }

    /// Re-queue a failed upload; false if the item is not failed
    pub async fn retry(&self, id: UploadId) -> bool {
        let summary = {
            let mut queue = self.queue.lock().await;
            if !queue.retry(id) {
                return false;
            }
            queue.summary()
        };
        info!(upload_id = %id, "Upload retry requested");
        self.queue_changed(summary);
        self.wake();
        true
    }

    /// Cancel an upload
    ///
    /// Queued and failed items are cancelled immediately. For an item in
    /// flight this requests cancellation; the worker settles it and frees
    /// its slot. Returns false for unknown or terminal items.
    pub async fn cancel(&self, id: UploadId) -> bool {
        let mut queue = self.queue.lock().await;
        let Some(status) = queue.get(id).map(|item| item.status) else {
            return false;
        };

        match status {
            UploadStatus::Queued | UploadStatus::Failed => {
                if !queue.transition(id, UploadStatus::Cancelled, None) {
                    return false;
                }
                let summary = queue.summary();
                drop(queue);
                info!(upload_id = %id, "Upload cancelled before transfer");
                self.event_bus.emit_lossy(PortalEvent::UploadCancelled {
                    upload_id: id,
                    was_active: false,
                    timestamp: Utc::now(),
                });
                self.queue_changed(summary);
                true
            }
            UploadStatus::Uploading => {
                drop(queue);
                info!(upload_id = %id, "Cancelling upload in flight");
                self.commands.send(WorkerCommand::Cancel(id)).is_ok()
            }
            UploadStatus::Completed | UploadStatus::Cancelled => false,
        }
    }

    /// Remove an item that is not in flight
    pub async fn remove(&self, id: UploadId) -> Option<UploadItem> {
        let (removed, summary) = {
            let mut queue = self.queue.lock().await;
            let removed = queue.remove(id)?;
            (removed, queue.summary())
        };
        self.queue_changed(summary);
        Some(removed)
    }

    pub async fn clear_completed(&self) -> usize {
        let (cleared, summary) = {
            let mut queue = self.queue.lock().await;
            (queue.clear_completed(), queue.summary())
        };
        if cleared > 0 {
            self.queue_changed(summary);
        }
        cleared
    }

    /// Drop every item and abandon every transfer in flight
    pub async fn clear_all(&self) {
        let summary = {
            let mut queue = self.queue.lock().await;
            queue.clear_all();
            queue.summary()
        };
        let _ = self.commands.send(WorkerCommand::CancelAll);
        info!("Upload queue cleared");
        self.queue_changed(summary);
    }

    /// Snapshot of all items in enqueue order
    pub async fn items(&self) -> Vec<UploadItem> {
        self.queue.lock().await.items().cloned().collect()
    }

    pub async fn get(&self, id: UploadId) -> Option<UploadItem> {
        self.queue.lock().await.get(id).cloned()
    }

    pub async fn summary(&self) -> QueueSummary {
        self.queue.lock().await.summary()
    }

    fn wake(&self) {
        if self.commands.send(WorkerCommand::Wake).is_err() {
            warn!("Upload worker is not running; queued items will wait");
        }
    }

    fn queue_changed(&self, summary: QueueSummary) {
        self.event_bus.emit_lossy(PortalEvent::QueueChanged {
            summary,
            timestamp: Utc::now(),
        });
    }
}

/// Upload worker task state
pub struct UploadWorker {
    queue: Arc<Mutex<UploadQueueManager>>,
    transport: Arc<dyn DocumentTransport>,
    event_bus: EventBus,
    config: UploadWorkerConfig,
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    progress_tx: mpsc::UnboundedSender<ProgressReport>,
    progress_rx: mpsc::UnboundedReceiver<ProgressReport>,
    completions: Option<mpsc::UnboundedSender<UploadCompletion>>,
    /// Per-transfer cancellation, children of `shutdown`
    active: HashMap<UploadId, CancellationToken>,
    shutdown: CancellationToken,
}

impl UploadWorker {
    /// Build a worker and its handle around an existing queue
    pub fn new(
        queue: UploadQueueManager,
        transport: Arc<dyn DocumentTransport>,
        event_bus: EventBus,
        config: UploadWorkerConfig,
        shutdown: CancellationToken,
    ) -> (Self, UploadWorkerHandle) {
        let queue = Arc::new(Mutex::new(queue));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();

        let handle = UploadWorkerHandle {
            queue: Arc::clone(&queue),
            commands: command_tx,
            event_bus: event_bus.clone(),
        };

        let worker = Self {
            queue,
            transport,
            event_bus,
            config,
            commands: command_rx,
            progress_tx,
            progress_rx,
            completions: None,
            active: HashMap::new(),
            shutdown,
        };

        (worker, handle)
    }

    /// Deliver every completed upload to `sink`
    ///
    /// Unlike the event bus this channel never drops a completion, so the
    /// progress model can rely on it.
    pub fn with_completion_sink(mut self, sink: mpsc::UnboundedSender<UploadCompletion>) -> Self {
        self.completions = Some(sink);
        self
    }

    /// Build and spawn the worker on the current runtime
    pub fn spawn(
        queue: UploadQueueManager,
        transport: Arc<dyn DocumentTransport>,
        event_bus: EventBus,
        config: UploadWorkerConfig,
        shutdown: CancellationToken,
    ) -> (UploadWorkerHandle, JoinHandle<()>) {
        let (worker, handle) = Self::new(queue, transport, event_bus, config, shutdown);
        let task = tokio::spawn(worker.run());
        (handle, task)
    }

    /// Drive the queue until shutdown
    pub async fn run(mut self) {
        info!("Upload worker started");
        let mut in_flight: InFlight = FuturesUnordered::new();

        let queue = Arc::clone(&self.queue);
        {
            let mut guard = queue.lock().await;
            self.start_ready(&mut guard, &mut in_flight);
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.abandon_in_flight().await;
                    break;
                }

                Some((id, outcome)) = in_flight.next() => {
                    let mut guard = queue.lock().await;
                    self.settle(&mut guard, id, outcome);
                    self.start_ready(&mut guard, &mut in_flight);
                }

                Some(command) = self.commands.recv() => {
                    match command {
                        WorkerCommand::Wake => {
                            let mut guard = queue.lock().await;
                            self.start_ready(&mut guard, &mut in_flight);
                        }
                        WorkerCommand::Cancel(id) => {
                            match self.active.get(&id) {
                                Some(token) => token.cancel(),
                                None => debug!(upload_id = %id, "Cancel for upload not in flight"),
                            }
                        }
                        WorkerCommand::CancelAll => {
                            for token in self.active.values() {
                                token.cancel();
                            }
                        }
                    }
                }

                Some(report) = self.progress_rx.recv() => {
                    let applied = {
                        let mut queue = queue.lock().await;
                        let same_attempt = queue
                            .get(report.upload_id)
                            .map(|item| item.retry_count == report.attempt)
                            .unwrap_or(false);
                        same_attempt && queue.set_progress(report.upload_id, report.percent)
                    };
                    if applied {
                        self.event_bus.emit_lossy(PortalEvent::UploadProgress {
                            upload_id: report.upload_id,
                            percent: report.percent,
                        });
                    } else {
                        debug!(
                            upload_id = %report.upload_id,
                            attempt = report.attempt,
                            "Progress report for a settled attempt dropped"
                        );
                    }
                }
            }
        }

        info!("Upload worker stopped");
    }

    /// Start queued items while the budget allows
    fn start_ready(&mut self, queue: &mut UploadQueueManager, in_flight: &mut InFlight) {
        let mut started = 0usize;

        while queue.can_start_new_upload() {
            let Some(id) = queue.next_queued() else {
                break;
            };
            if !queue.transition(id, UploadStatus::Uploading, None) {
                break;
            }
            queue.increment_active_uploads();

            let Some(item) = queue.get(id) else {
                break;
            };
            let request = TransferRequest {
                upload_id: id,
                file: item.file.clone(),
                document_type: item.document_type,
            };
            let retry_count = item.retry_count;

            let token = self.shutdown.child_token();
            self.active.insert(id, token.clone());
            let reporter = ProgressReporter::new(id, retry_count, self.progress_tx.clone());

            in_flight.push(
                run_transfer(
                    Arc::clone(&self.transport),
                    request,
                    reporter,
                    token,
                    self.config.transfer_timeout,
                )
                .boxed(),
            );

            info!(upload_id = %id, retry_count, active = queue.active_count(), "Upload started");
            self.event_bus.emit_lossy(PortalEvent::UploadStarted {
                upload_id: id,
                retry_count,
                timestamp: Utc::now(),
            });
            started += 1;
        }

        if started > 0 {
            self.emit_queue_changed(queue.summary());
        }
    }

    /// Apply a transfer outcome and release its slot
    ///
    /// Only an item still in `uploading` releases a slot, so every started
    /// transfer decrements exactly once even if the queue was cleared.
    fn settle(&mut self, queue: &mut UploadQueueManager, id: UploadId, outcome: TransferOutcome) {
        self.active.remove(&id);

        let is_uploading = queue
            .get(id)
            .map(|item| item.status == UploadStatus::Uploading)
            .unwrap_or(false);
        if !is_uploading {
            debug!(upload_id = %id, ?outcome, "Transfer settled for an item no longer in flight");
            return;
        }

        let now = Utc::now();
        match outcome {
            TransferOutcome::Completed(receipt) => {
                let document_type = receipt.document_type;
                let verified = receipt.verified;
                if let Some(sink) = &self.completions {
                    let completion = UploadCompletion {
                        upload_id: id,
                        receipt: receipt.clone(),
                    };
                    if sink.send(completion).is_err() {
                        warn!(upload_id = %id, "Completion sink closed, upload not recorded");
                    }
                }
                queue.set_result(id, receipt);
                queue.transition(id, UploadStatus::Completed, None);
                queue.decrement_active_uploads();
                info!(upload_id = %id, %document_type, verified, "Upload completed");
                self.event_bus.emit_lossy(PortalEvent::UploadCompleted {
                    upload_id: id,
                    document_type,
                    verified,
                    timestamp: now,
                });
            }
            TransferOutcome::Failed(message) => {
                queue.transition(id, UploadStatus::Failed, Some(message.clone()));
                queue.decrement_active_uploads();
                let retry_count = queue.get(id).map(|item| item.retry_count).unwrap_or(0);
                warn!(upload_id = %id, error = %message, retry_count, "Upload failed");
                self.event_bus.emit_lossy(PortalEvent::UploadFailed {
                    upload_id: id,
                    error: message,
                    retry_count,
                    timestamp: now,
                });
            }
            TransferOutcome::Cancelled => {
                queue.transition(id, UploadStatus::Cancelled, None);
                queue.decrement_active_uploads();
                info!(upload_id = %id, "Upload cancelled in flight");
                self.event_bus.emit_lossy(PortalEvent::UploadCancelled {
                    upload_id: id,
                    was_active: true,
                    timestamp: now,
                });
            }
        }

        self.emit_queue_changed(queue.summary());
    }

    /// Shutdown: cancel and settle everything still in flight
    async fn abandon_in_flight(&mut self) {
        if self.active.is_empty() {
            return;
        }
        let queue = Arc::clone(&self.queue);
        let mut guard = queue.lock().await;
        let ids: Vec<UploadId> = self.active.keys().copied().collect();
        for id in ids {
            if let Some(token) = self.active.get(&id) {
                token.cancel();
            }
            self.settle(&mut guard, id, TransferOutcome::Cancelled);
        }
    }

    fn emit_queue_changed(&self, summary: QueueSummary) {
        self.event_bus.emit_lossy(PortalEvent::QueueChanged {
            summary,
            timestamp: Utc::now(),
        });
    }
}

/// One transfer, raced against its token and the optional timeout
async fn run_transfer(
    transport: Arc<dyn DocumentTransport>,
    request: TransferRequest,
    progress: ProgressReporter,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> (UploadId, TransferOutcome) {
    let id = request.upload_id;
    let transfer = transport.transfer(request, progress, cancel.clone());

    let limited = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, transfer).await {
                Ok(result) => result,
                Err(_) => Err(TransferError::TimedOut(limit.as_secs())),
            },
            None => transfer.await,
        }
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        result = limited => result,
    };

    let outcome = match result {
        Ok(receipt) => TransferOutcome::Completed(receipt),
        Err(TransferError::Cancelled) => TransferOutcome::Cancelled,
        Err(e) => TransferOutcome::Failed(e.to_string()),
    };
    (id, outcome)
}
