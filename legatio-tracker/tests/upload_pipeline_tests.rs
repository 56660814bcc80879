//! Upload pipeline integration tests
//!
//! Drives the queue through the worker with a transport whose transfers the
//! test finishes by hand, so every interleaving below is deterministic.

mod helpers;

use helpers::{eventually, file, wait_for_status, ManualTransport, APP_ID};
use legatio_common::events::{EventBus, PortalEvent};
use legatio_common::{ApplicationStatus, DocumentType, VisaType};
use legatio_tracker::event_bridge::spawn_upload_bridge;
use legatio_tracker::models::{StageId, UploadStatus};
use legatio_tracker::services::{
    ApplicationProgressModel, InMemoryBackend, InMemoryFlagStore, PollOutcome, PublishedSnapshot,
    QueueConfig, StatusPoller, StatusPollerConfig, UploadCompletion, UploadQueueManager,
    UploadWorker, UploadWorkerConfig, UploadWorkerHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn start_worker(
    max_concurrent: usize,
    transport: Arc<ManualTransport>,
    event_bus: &EventBus,
    shutdown: &CancellationToken,
) -> (UploadWorkerHandle, JoinHandle<()>) {
    let queue = UploadQueueManager::new(QueueConfig::new(max_concurrent).unwrap());
    UploadWorker::spawn(
        queue,
        transport,
        event_bus.clone(),
        UploadWorkerConfig::default(),
        shutdown.clone(),
    )
}

/// Worker wired to the progress bridge the way the service runs it
fn start_worker_with_bridge(
    max_concurrent: usize,
    transport: Arc<ManualTransport>,
    event_bus: &EventBus,
    poller: &StatusPoller,
    shutdown: &CancellationToken,
) -> (UploadWorkerHandle, JoinHandle<()>, JoinHandle<()>) {
    let (completion_tx, completion_rx) = mpsc::unbounded_channel::<UploadCompletion>();
    let queue = UploadQueueManager::new(QueueConfig::new(max_concurrent).unwrap());
    let (worker, handle) = UploadWorker::new(
        queue,
        transport,
        event_bus.clone(),
        UploadWorkerConfig::default(),
        shutdown.clone(),
    );
    let task = tokio::spawn(worker.with_completion_sink(completion_tx).run());
    let bridge = spawn_upload_bridge(completion_rx, poller.clone(), shutdown.clone());
    (handle, task, bridge)
}

async fn business_poller(bus: &EventBus) -> StatusPoller {
    let backend = Arc::new(InMemoryBackend::new());
    backend.register(APP_ID, ApplicationStatus::Submitted).await;
    let poller = StatusPoller::new(
        ApplicationProgressModel::new(APP_ID, VisaType::Business),
        backend,
        Arc::new(InMemoryFlagStore::new()),
        bus.clone(),
        StatusPollerConfig::default(),
    );
    assert_eq!(poller.refresh_now().await, PollOutcome::Applied(1));
    poller
}

fn document_gate_open(snapshot: &PublishedSnapshot) -> bool {
    snapshot
        .snapshot
        .view(StageId::DocumentCollection)
        .map(|view| view.completed)
        .unwrap_or(false)
}

async fn wait_for_document_gate(poller: &StatusPoller) {
    let mut published = poller.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        published.wait_for(document_gate_open),
    )
    .await
    .expect("document gate never opened")
    .unwrap();
}

#[tokio::test]
async fn test_concurrency_cap_and_refill() {
    let transport = ManualTransport::new();
    let bus = EventBus::new(256);
    let shutdown = CancellationToken::new();
    let (handle, task) = start_worker(2, Arc::clone(&transport), &bus, &shutdown);

    let a = handle.enqueue(file("a.pdf"), DocumentType::Passport).await;
    let b = handle.enqueue(file("b.pdf"), DocumentType::Photo).await;
    let c = handle.enqueue(file("c.pdf"), DocumentType::BankStatement).await;

    eventually("two transfers in flight", || transport.pending_count() == 2).await;
    assert!(transport.is_pending("a.pdf"));
    assert!(transport.is_pending("b.pdf"));
    assert_eq!(handle.get(c).await.unwrap().status, UploadStatus::Queued);

    let summary = handle.summary().await;
    assert_eq!(summary.active, 2);
    assert_eq!(summary.uploading, 2);
    assert_eq!(summary.queued, 1);

    assert!(transport.finish("a.pdf", Ok(true)));
    wait_for_status(&handle, a, UploadStatus::Completed).await;
    eventually("third transfer starts", || transport.is_pending("c.pdf")).await;

    let summary = handle.summary().await;
    assert_eq!(summary.active, 2);
    assert_eq!(summary.completed, 1);

    assert!(transport.finish("b.pdf", Ok(false)));
    assert!(transport.finish("c.pdf", Ok(true)));
    wait_for_status(&handle, b, UploadStatus::Completed).await;
    wait_for_status(&handle, c, UploadStatus::Completed).await;

    let done = handle.get(a).await.unwrap();
    assert_eq!(done.progress, Some(100));
    assert!(done.result.unwrap().verified);
    assert!(!handle.get(b).await.unwrap().result.unwrap().verified);

    let summary = handle.summary().await;
    assert_eq!(summary.active, 0);
    assert_eq!(summary.completed, 3);
    assert_eq!(transport.started(), 3);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_cancel_in_flight_frees_slot() {
    let transport = ManualTransport::new();
    let bus = EventBus::new(256);
    let mut rx = bus.subscribe();
    let shutdown = CancellationToken::new();
    let (handle, task) = start_worker(1, Arc::clone(&transport), &bus, &shutdown);

    let a = handle.enqueue(file("a.pdf"), DocumentType::Passport).await;
    let b = handle.enqueue(file("b.pdf"), DocumentType::Photo).await;
    eventually("first transfer in flight", || transport.is_pending("a.pdf")).await;
    assert_eq!(handle.get(b).await.unwrap().status, UploadStatus::Queued);

    assert!(handle.cancel(a).await);
    wait_for_status(&handle, a, UploadStatus::Cancelled).await;
    eventually("next transfer takes the slot", || transport.is_pending("b.pdf")).await;

    let summary = handle.summary().await;
    assert_eq!(summary.active, 1);
    assert_eq!(summary.uploading, 1);
    assert_eq!(summary.cancelled, 1);

    // Terminal items cannot be cancelled again
    assert!(!handle.cancel(a).await);

    let mut saw_active_cancel = false;
    while let Ok(event) = rx.try_recv() {
        if let PortalEvent::UploadCancelled {
            upload_id,
            was_active,
            ..
        } = event
        {
            if upload_id == a {
                saw_active_cancel = was_active;
            }
        }
    }
    assert!(saw_active_cancel);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_cancel_queued_item_never_transfers() {
    let transport = ManualTransport::new();
    let bus = EventBus::new(256);
    let shutdown = CancellationToken::new();
    let (handle, task) = start_worker(1, Arc::clone(&transport), &bus, &shutdown);

    let a = handle.enqueue(file("a.pdf"), DocumentType::Passport).await;
    let b = handle.enqueue(file("b.pdf"), DocumentType::Photo).await;
    eventually("first transfer in flight", || transport.is_pending("a.pdf")).await;

    assert!(handle.cancel(b).await);
    assert_eq!(handle.get(b).await.unwrap().status, UploadStatus::Cancelled);

    assert!(transport.finish("a.pdf", Ok(true)));
    wait_for_status(&handle, a, UploadStatus::Completed).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.started(), 1);
    assert_eq!(handle.summary().await.active, 0);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_failure_does_not_stall_queue_and_retry_succeeds() {
    let transport = ManualTransport::new();
    let bus = EventBus::new(256);
    let shutdown = CancellationToken::new();
    let (handle, task) = start_worker(1, Arc::clone(&transport), &bus, &shutdown);

    let a = handle.enqueue(file("a.pdf"), DocumentType::Passport).await;
    let b = handle.enqueue(file("b.pdf"), DocumentType::Photo).await;
    eventually("first transfer in flight", || transport.is_pending("a.pdf")).await;

    assert!(transport.finish("a.pdf", Err("rejected by scanner".to_string())));
    wait_for_status(&handle, a, UploadStatus::Failed).await;
    let failed = handle.get(a).await.unwrap();
    assert_eq!(failed.error.as_deref(), Some("rejected by scanner"));
    assert!(failed.result.is_none());

    eventually("queue moves on after failure", || transport.is_pending("b.pdf")).await;
    assert!(transport.finish("b.pdf", Ok(true)));
    wait_for_status(&handle, b, UploadStatus::Completed).await;

    // Retry only applies to failed items
    assert!(!handle.retry(b).await);
    assert!(handle.retry(a).await);
    eventually("retried transfer in flight", || transport.is_pending("a.pdf")).await;

    let retried = handle.get(a).await.unwrap();
    assert_eq!(retried.status, UploadStatus::Uploading);
    assert_eq!(retried.retry_count, 1);
    assert!(retried.error.is_none());

    assert!(transport.finish("a.pdf", Ok(true)));
    wait_for_status(&handle, a, UploadStatus::Completed).await;
    assert_eq!(handle.summary().await.active, 0);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_remove_and_clear_completed() {
    let transport = ManualTransport::new();
    let bus = EventBus::new(256);
    let shutdown = CancellationToken::new();
    let (handle, task) = start_worker(1, Arc::clone(&transport), &bus, &shutdown);

    let a = handle.enqueue(file("a.pdf"), DocumentType::Passport).await;
    let b = handle.enqueue(file("b.pdf"), DocumentType::Photo).await;
    eventually("first transfer in flight", || transport.is_pending("a.pdf")).await;

    // In-flight items cannot be removed
    assert!(handle.remove(a).await.is_none());
    let removed = handle.remove(b).await.unwrap();
    assert_eq!(removed.file.name, "b.pdf");

    assert!(transport.finish("a.pdf", Ok(true)));
    wait_for_status(&handle, a, UploadStatus::Completed).await;
    assert_eq!(handle.clear_completed().await, 1);
    assert!(handle.items().await.is_empty());

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_late_progress_from_failed_attempt_is_dropped() {
    let transport = ManualTransport::new();
    let bus = EventBus::new(256);
    let shutdown = CancellationToken::new();
    let (handle, task) = start_worker(1, Arc::clone(&transport), &bus, &shutdown);

    let a = handle.enqueue(file("a.pdf"), DocumentType::Passport).await;
    eventually("first attempt in flight", || transport.is_pending("a.pdf")).await;
    let first_attempt = transport.reporter("a.pdf").unwrap();
    assert_eq!(first_attempt.attempt(), 0);

    assert!(transport.finish("a.pdf", Err("timeout at gateway".to_string())));
    wait_for_status(&handle, a, UploadStatus::Failed).await;

    let mut rx = bus.subscribe();
    assert!(handle.retry(a).await);
    eventually("second attempt in flight", || transport.is_pending("a.pdf")).await;
    let second_attempt = transport.reporter("a.pdf").unwrap();
    assert_eq!(second_attempt.attempt(), 1);

    // Reports arrive in send order, so 77 is settled before 20 lands
    first_attempt.report(77);
    second_attempt.report(20);
    let mut percents = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(PortalEvent::UploadProgress { percent, .. }) => {
                    percents.push(percent);
                    if percent == 20 {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => panic!("bus error: {}", e),
            }
        }
    })
    .await
    .expect("current attempt progress never arrived");
    assert!(!percents.contains(&77), "stale progress applied: {:?}", percents);
    assert_eq!(handle.get(a).await.unwrap().progress, Some(20));

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_completed_upload_advances_document_gate() {
    let transport = ManualTransport::new();
    let bus = EventBus::new(256);
    let shutdown = CancellationToken::new();
    let poller = business_poller(&bus).await;
    let (handle, task, bridge) =
        start_worker_with_bridge(2, Arc::clone(&transport), &bus, &poller, &shutdown);

    let passport = handle.enqueue(file("passport.pdf"), DocumentType::Passport).await;
    let letter = handle
        .enqueue(file("invitation.pdf"), DocumentType::InvitationLetter)
        .await;
    eventually("both transfers in flight", || transport.pending_count() == 2).await;

    assert!(transport.finish("passport.pdf", Ok(true)));
    wait_for_status(&handle, passport, UploadStatus::Completed).await;
    assert!(transport.finish("invitation.pdf", Ok(false)));
    wait_for_status(&handle, letter, UploadStatus::Completed).await;
    wait_for_document_gate(&poller).await;

    let current = poller.current();
    assert_eq!(current.sequence, 1);
    let stage = current.snapshot.current_stage().unwrap();
    assert_eq!(stage.stage.id, StageId::BiometricCollection);
    assert!(stage.blocked);
    assert!(current.snapshot.actions.capture_biometrics);

    // Backend has not caught up; the next poll keeps the uploaded documents
    assert_eq!(poller.refresh_now().await, PollOutcome::Applied(2));
    assert!(document_gate_open(&poller.current()));

    shutdown.cancel();
    task.await.unwrap();
    bridge.await.unwrap();
}

#[tokio::test]
async fn test_document_gate_advances_when_bus_subscriber_lags() {
    let transport = ManualTransport::new();
    // One-slot bus and a subscriber that never reads
    let bus = EventBus::new(1);
    let mut stalled = bus.subscribe();
    let shutdown = CancellationToken::new();
    let poller = business_poller(&bus).await;
    let (handle, task, bridge) =
        start_worker_with_bridge(2, Arc::clone(&transport), &bus, &poller, &shutdown);

    let passport = handle.enqueue(file("passport.pdf"), DocumentType::Passport).await;
    let letter = handle
        .enqueue(file("invitation.pdf"), DocumentType::InvitationLetter)
        .await;
    eventually("both transfers in flight", || transport.pending_count() == 2).await;

    for percent in [20, 35, 50, 65, 80, 95] {
        transport.reporter("passport.pdf").unwrap().report(percent);
        transport.reporter("invitation.pdf").unwrap().report(percent);
    }
    assert!(transport.finish("passport.pdf", Ok(true)));
    assert!(transport.finish("invitation.pdf", Ok(true)));
    wait_for_status(&handle, passport, UploadStatus::Completed).await;
    wait_for_status(&handle, letter, UploadStatus::Completed).await;

    assert!(matches!(stalled.try_recv(), Err(TryRecvError::Lagged(_))));
    wait_for_document_gate(&poller).await;

    shutdown.cancel();
    task.await.unwrap();
    bridge.await.unwrap();
}
