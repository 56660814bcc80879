//! Upload completion bridge
//!
//! Feeds finished uploads into the progress model so the document gate
//! moves without waiting for the next poll.
//!
//! **Architecture:**
//! - Receives from the worker's completion sink, not the event bus, so a
//!   burst of progress events can never crowd out a completion
//! - Records each document in the progress model
//! - Asks the status poller to republish the evaluated snapshot

use crate::services::status_poller::StatusPoller;
use crate::services::upload_worker::UploadCompletion;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Spawn the bridge on the current runtime
pub fn spawn_upload_bridge(
    completions: mpsc::UnboundedReceiver<UploadCompletion>,
    poller: StatusPoller,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_upload_bridge(completions, poller, shutdown))
}

/// Bridge loop; runs until shutdown or until every sender is gone
pub async fn run_upload_bridge(
    mut completions: mpsc::UnboundedReceiver<UploadCompletion>,
    poller: StatusPoller,
    shutdown: CancellationToken,
) {
    debug!("Upload bridge started");

    loop {
        let completion = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = completions.recv() => received,
        };
        let Some(UploadCompletion { upload_id, receipt }) = completion else {
            debug!("Upload bridge: completion sink closed, shutting down");
            break;
        };

        let document_type = receipt.document_type;
        let newly_covered = {
            let shared = poller.model();
            let mut model = shared.write().await;
            model.record_document(document_type, receipt.verified)
        };
        info!(
            upload_id = %upload_id,
            %document_type,
            verified = receipt.verified,
            newly_covered,
            "Uploaded document fed into progress model"
        );
        if !poller.republish().await {
            debug!("Poller stopped, snapshot not republished");
        }
    }

    debug!("Upload bridge stopped");
}
