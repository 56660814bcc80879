//! Status poller
//!
//! Refreshes gate signals on a fixed interval and on demand, feeds them to
//! the progress model and publishes the evaluated snapshot.
//!
//! **Sequencing:** every poll draws a number from a monotonically increasing
//! counter. A result is applied only if its number is above both the last
//! applied number and the acceptance floor raised by [`StatusPoller::stop`],
//! so a poll that was already running when polling stopped can never
//! overwrite the published snapshot.
//!
//! **Overlap:** at most one poll runs at a time. A tick (or an on-demand
//! refresh) arriving while a poll is outstanding is skipped, not queued.

use crate::models::{FlagName, PipelineSnapshot};
use crate::services::progress_model::{ApplicationProgressModel, FetchedSignals};
use crate::services::providers::{FlagStore, PortalBackend, ProviderError};
use chrono::{DateTime, Utc};
use legatio_common::events::{EventBus, PortalEvent};
use legatio_common::{ApplicationStatus, VisaType};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snapshot as last published to consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedSnapshot {
    pub application_id: String,
    pub snapshot: PipelineSnapshot,
    pub backend_status: ApplicationStatus,
    pub estimated_processing_days: u32,
    /// Sequence number of the poll that produced it; 0 before the first poll
    pub sequence: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Error from the most recent poll, if it failed
    pub last_error: Option<String>,
    /// True while the signals behind `snapshot` could not be refreshed
    pub stale: bool,
}

/// Result of one poll attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PollOutcome {
    /// New signals applied and published
    Applied(u64),
    /// Another poll was in flight
    Skipped,
    /// Result arrived after a newer poll or after stop; discarded
    Stale(u64),
    /// Providers failed; previous snapshot kept
    Failed(String),
    /// Poller has been stopped
    Stopped,
}

/// Poller timing
#[derive(Debug, Clone, Copy)]
pub struct StatusPollerConfig {
    pub interval: Duration,
    pub poll_timeout: Option<Duration>,
}

impl Default for StatusPollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            poll_timeout: None,
        }
    }
}

struct PollerInner {
    model: Arc<RwLock<ApplicationProgressModel>>,
    backend: Arc<dyn PortalBackend>,
    flags: Arc<dyn FlagStore>,
    event_bus: EventBus,
    config: StatusPollerConfig,
    /// Last sequence number handed out
    sequence: AtomicU64,
    /// Highest sequence number applied (success or failure)
    applied: AtomicU64,
    /// Results at or below this sequence are discarded
    floor: AtomicU64,
    in_flight: AtomicBool,
    started: AtomicBool,
    stopped: AtomicBool,
    ticker: CancellationToken,
    /// Serializes the accept check with the publish that follows it
    publish_lock: Mutex<()>,
    published: watch::Sender<PublishedSnapshot>,
}

/// Releases the in-flight flag when a poll ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to the status poller; clones share one poller
#[derive(Clone)]
pub struct StatusPoller {
    inner: Arc<PollerInner>,
}

impl StatusPoller {
    pub fn new(
        model: ApplicationProgressModel,
        backend: Arc<dyn PortalBackend>,
        flags: Arc<dyn FlagStore>,
        event_bus: EventBus,
        config: StatusPollerConfig,
    ) -> Self {
        let initial = PublishedSnapshot {
            application_id: model.application_id().to_string(),
            snapshot: model.snapshot(),
            backend_status: model.backend_status(),
            estimated_processing_days: model.estimated_processing_days(),
            sequence: 0,
            refreshed_at: None,
            last_error: None,
            stale: false,
        };
        let (published, _) = watch::channel(initial);

        Self {
            inner: Arc::new(PollerInner {
                model: Arc::new(RwLock::new(model)),
                backend,
                flags,
                event_bus,
                config,
                sequence: AtomicU64::new(0),
                applied: AtomicU64::new(0),
                floor: AtomicU64::new(0),
                in_flight: AtomicBool::new(false),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                ticker: CancellationToken::new(),
                publish_lock: Mutex::new(()),
                published,
            }),
        }
    }

    /// Shared progress model the poller feeds
    pub fn model(&self) -> Arc<RwLock<ApplicationProgressModel>> {
        Arc::clone(&self.inner.model)
    }

    pub fn current(&self) -> PublishedSnapshot {
        self.inner.published.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PublishedSnapshot> {
        self.inner.published.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn is_polling(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Spawn the interval ticker
    ///
    /// The first tick fires immediately. Returns None if the ticker is
    /// already running or the poller was stopped.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.is_stopped() {
            warn!("Status poller already stopped, not starting");
            return None;
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("Status poller already started");
            return None;
        }

        let poller = self.clone();
        let token = self.inner.ticker.clone();
        let period = self.inner.config.interval;
        info!(interval_secs = period.as_secs_f64(), "Status poller started");

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Status poller ticker cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if poller.is_polling() {
                            debug!("Poll still in flight, tick skipped");
                            continue;
                        }
                        let tick_poller = poller.clone();
                        tokio::spawn(async move {
                            tick_poller.poll_once().await;
                        });
                    }
                }
            }
        }))
    }

    /// Stop ticking and discard any poll still outstanding
    pub async fn stop(&self) {
        let _publish = self.inner.publish_lock.lock().await;
        self.inner.stopped.store(true, Ordering::SeqCst);
        let floor = self.inner.sequence.load(Ordering::SeqCst);
        self.inner.floor.fetch_max(floor, Ordering::SeqCst);
        self.inner.ticker.cancel();
        info!(floor, "Status poller stopped");
    }

    /// Poll now on the caller's task
    pub async fn refresh_now(&self) -> PollOutcome {
        self.poll_once().await
    }

    /// Re-evaluate the model and publish without fetching
    ///
    /// Used when a local signal (a finished upload, a flag set through the
    /// API) changed the model. Keeps the current sequence, error and
    /// staleness. Returns false once stopped.
    pub async fn republish(&self) -> bool {
        let _publish = self.inner.publish_lock.lock().await;
        if self.is_stopped() {
            return false;
        }
        let previous = self.current();
        self.publish(previous.sequence, previous.last_error, previous.stale).await;
        true
    }

    async fn poll_once(&self) -> PollOutcome {
        if self.is_stopped() {
            return PollOutcome::Stopped;
        }

        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Poll already in flight, skipped");
            return PollOutcome::Skipped;
        }
        let _in_flight = InFlightGuard(&self.inner.in_flight);

        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let (application_id, visa_type, flags_version) = {
            let model = self.inner.model.read().await;
            (
                model.application_id().to_string(),
                model.visa_type(),
                model.flags_version(),
            )
        };
        debug!(sequence, %application_id, "Polling application status");

        let fetch = self.fetch(&application_id, visa_type, flags_version);
        let fetched = match self.inner.config.poll_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Unavailable(format!(
                    "poll timed out after {}s",
                    limit.as_secs()
                ))),
            },
            None => fetch.await,
        };

        let _publish = self.inner.publish_lock.lock().await;
        let floor = self.inner.floor.load(Ordering::SeqCst);
        let applied = self.inner.applied.load(Ordering::SeqCst);
        // Stop may land between the stopped check above and the draw, leaving
        // this sequence above the floor
        if self.is_stopped() || sequence <= floor || sequence <= applied {
            debug!(sequence, floor, applied, "Discarding late poll result");
            return PollOutcome::Stale(sequence);
        }
        self.inner.applied.store(sequence, Ordering::SeqCst);

        match fetched {
            Ok(signals) => {
                self.inner.model.write().await.apply_poll(signals);
                self.publish(sequence, None, false).await;
                PollOutcome::Applied(sequence)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    sequence,
                    %application_id,
                    error = %message,
                    "Status poll failed, keeping previous snapshot"
                );

                let mut previous = self.current();
                previous.sequence = sequence;
                previous.last_error = Some(message.clone());
                previous.stale = true;
                self.inner.published.send_replace(previous);

                self.inner.event_bus.emit_lossy(PortalEvent::PollFailed {
                    application_id,
                    sequence,
                    error: message.clone(),
                    timestamp: Utc::now(),
                });
                PollOutcome::Failed(message)
            }
        }
    }

    async fn fetch(
        &self,
        application_id: &str,
        visa_type: VisaType,
        flags_version: u64,
    ) -> Result<FetchedSignals, ProviderError> {
        let backend = &self.inner.backend;
        let flags = &self.inner.flags;

        let (requirements, documents, status, biometric_done, payment_done) = tokio::try_join!(
            backend.document_requirements(visa_type),
            backend.application_documents(application_id),
            backend.application_status(application_id),
            async {
                flags
                    .get(application_id, FlagName::BiometricDone)
                    .await
                    .map_err(ProviderError::from)
            },
            async {
                flags
                    .get(application_id, FlagName::PaymentDone)
                    .await
                    .map_err(ProviderError::from)
            },
        )?;

        Ok(FetchedSignals {
            requirements,
            documents,
            status,
            biometric_done,
            payment_done,
            flags_version,
        })
    }

    /// Evaluate the model and publish; caller holds `publish_lock`
    async fn publish(&self, sequence: u64, last_error: Option<String>, stale: bool) {
        let published = {
            let model = self.inner.model.read().await;
            PublishedSnapshot {
                application_id: model.application_id().to_string(),
                snapshot: model.snapshot(),
                backend_status: model.backend_status(),
                estimated_processing_days: model.estimated_processing_days(),
                sequence,
                refreshed_at: model.refreshed_at(),
                last_error,
                stale,
            }
        };

        let current = published.snapshot.current_stage();
        let event = PortalEvent::SnapshotPublished {
            application_id: published.application_id.clone(),
            sequence,
            progress_percent: published.snapshot.progress_percent,
            current_stage: current.map(|view| view.stage.id.to_string()),
            blocked: current.map(|view| view.blocked).unwrap_or(false),
            timestamp: Utc::now(),
        };

        debug!(
            sequence,
            progress_percent = published.snapshot.progress_percent,
            "Snapshot published"
        );
        self.inner.published.send_replace(published);
        self.inner.event_bus.emit_lossy(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::{InMemoryBackend, InMemoryFlagStore};

    async fn poller() -> StatusPoller {
        let backend = InMemoryBackend::new();
        backend.register("app-1", ApplicationStatus::Submitted).await;
        StatusPoller::new(
            ApplicationProgressModel::new("app-1", VisaType::Tourist),
            Arc::new(backend),
            Arc::new(InMemoryFlagStore::new()),
            EventBus::new(16),
            StatusPollerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_stop_after_sequence_drawn_discards_result() {
        let poller = poller().await;

        // Hold the model so the poll parks right after drawing its sequence
        let shared = poller.model();
        let guard = shared.write().await;
        let task = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.refresh_now().await })
        };
        while poller.inner.sequence.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // Stop whose floor was read before the draw: floor stays below it
        poller.inner.stopped.store(true, Ordering::SeqCst);
        assert_eq!(poller.inner.floor.load(Ordering::SeqCst), 0);
        drop(guard);

        assert_eq!(task.await.unwrap(), PollOutcome::Stale(1));
        assert_eq!(poller.current().sequence, 0);
        assert!(poller.current().refreshed_at.is_none());
    }

    #[tokio::test]
    async fn test_stop_raises_floor_to_last_sequence() {
        let poller = poller().await;
        assert_eq!(poller.refresh_now().await, PollOutcome::Applied(1));
        poller.stop().await;
        assert_eq!(poller.inner.floor.load(Ordering::SeqCst), 1);
        assert_eq!(poller.refresh_now().await, PollOutcome::Stopped);
    }
}
