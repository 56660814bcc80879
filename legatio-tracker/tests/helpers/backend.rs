//! Backend whose status call can be held open

use async_trait::async_trait;
use legatio_common::{ApplicationStatus, VisaType};
use legatio_tracker::models::{DocumentRecord, DocumentRequirements};
use legatio_tracker::services::{InMemoryBackend, PortalBackend, ProviderError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Wraps an InMemoryBackend; while held, each status call waits for a release
pub struct GatedBackend {
    pub inner: InMemoryBackend,
    hold: AtomicBool,
    gate: Semaphore,
    status_calls: AtomicUsize,
}

impl GatedBackend {
    pub fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            hold: AtomicBool::new(false),
            gate: Semaphore::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    /// Let one held status call through
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortalBackend for GatedBackend {
    async fn document_requirements(
        &self,
        visa_type: VisaType,
    ) -> Result<DocumentRequirements, ProviderError> {
        self.inner.document_requirements(visa_type).await
    }

    async fn application_documents(
        &self,
        application_id: &str,
    ) -> Result<Vec<DocumentRecord>, ProviderError> {
        self.inner.application_documents(application_id).await
    }

    async fn application_status(
        &self,
        application_id: &str,
    ) -> Result<ApplicationStatus, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
        self.inner.application_status(application_id).await
    }
}
