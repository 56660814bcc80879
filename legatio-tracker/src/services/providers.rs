//! External signal providers
//!
//! The poller pulls gate signals through two seams: [`PortalBackend`] for
//! requirements, documents and status, and [`FlagStore`] for the applicant's
//! biometric/payment completion flags. In-memory implementations back the
//! demo binary and the tests; `crate::db::flags::SqliteFlagStore` persists
//! flags across restarts.

use crate::models::{DocumentRecord, DocumentRequirements, FlagName};
use async_trait::async_trait;
use legatio_common::{ApplicationStatus, DocumentType, VisaType};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// Provider failure; the poller keeps the previous snapshot
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<legatio_common::Error> for ProviderError {
    fn from(err: legatio_common::Error) -> Self {
        ProviderError::Storage(err.to_string())
    }
}

/// Application backend pull API
#[async_trait]
pub trait PortalBackend: Send + Sync {
    async fn document_requirements(
        &self,
        visa_type: VisaType,
    ) -> Result<DocumentRequirements, ProviderError>;

    async fn application_documents(
        &self,
        application_id: &str,
    ) -> Result<Vec<DocumentRecord>, ProviderError>;

    async fn application_status(
        &self,
        application_id: &str,
    ) -> Result<ApplicationStatus, ProviderError>;
}

/// Persisted boolean completion flags keyed by application
///
/// A flag that was never set reads as false.
#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn get(&self, application_id: &str, flag: FlagName) -> legatio_common::Result<bool>;

    async fn set(
        &self,
        application_id: &str,
        flag: FlagName,
        value: bool,
    ) -> legatio_common::Result<()>;
}

#[derive(Debug, Clone)]
struct ApplicationRecord {
    status: ApplicationStatus,
    documents: Vec<DocumentRecord>,
}

/// Backend held in memory, seeded with the default requirement catalog
#[derive(Debug)]
pub struct InMemoryBackend {
    applications: RwLock<HashMap<String, ApplicationRecord>>,
    requirements: RwLock<HashMap<VisaType, DocumentRequirements>>,
    available: AtomicBool,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            applications: RwLock::new(HashMap::new()),
            requirements: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Register an application with no documents on file
    pub async fn register(&self, application_id: &str, status: ApplicationStatus) {
        self.applications.write().await.insert(
            application_id.to_string(),
            ApplicationRecord {
                status,
                documents: Vec::new(),
            },
        );
    }

    /// Returns false for unknown applications
    pub async fn set_status(&self, application_id: &str, status: ApplicationStatus) -> bool {
        match self.applications.write().await.get_mut(application_id) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    /// Record a document on file, replacing any earlier one of the same type
    pub async fn add_document(
        &self,
        application_id: &str,
        document_type: DocumentType,
        verified: bool,
    ) -> bool {
        match self.applications.write().await.get_mut(application_id) {
            Some(record) => {
                record.documents.retain(|doc| doc.document_type != document_type);
                record.documents.push(DocumentRecord {
                    document_type,
                    verified,
                });
                true
            }
            None => false,
        }
    }

    /// Override the catalog entry for one visa type
    pub async fn set_requirements(&self, visa_type: VisaType, requirements: DocumentRequirements) {
        self.requirements.write().await.insert(visa_type, requirements);
    }

    /// Simulate an outage: every call fails with `Unavailable` while false
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Unavailable("backend offline".to_string()))
        }
    }

    async fn record(&self, application_id: &str) -> Result<ApplicationRecord, ProviderError> {
        self.applications
            .read()
            .await
            .get(application_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("application {}", application_id)))
    }
}

#[async_trait]
impl PortalBackend for InMemoryBackend {
    async fn document_requirements(
        &self,
        visa_type: VisaType,
    ) -> Result<DocumentRequirements, ProviderError> {
        self.check_available()?;
        let overridden = self.requirements.read().await.get(&visa_type).cloned();
        Ok(overridden.unwrap_or_else(|| DocumentRequirements::for_visa_type(visa_type)))
    }

    async fn application_documents(
        &self,
        application_id: &str,
    ) -> Result<Vec<DocumentRecord>, ProviderError> {
        self.check_available()?;
        Ok(self.record(application_id).await?.documents)
    }

    async fn application_status(
        &self,
        application_id: &str,
    ) -> Result<ApplicationStatus, ProviderError> {
        self.check_available()?;
        Ok(self.record(application_id).await?.status)
    }
}

/// Flags held in memory for the life of the process
#[derive(Debug, Default)]
pub struct InMemoryFlagStore {
    flags: RwLock<HashMap<(String, FlagName), bool>>,
}

impl InMemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlagStore for InMemoryFlagStore {
    async fn get(&self, application_id: &str, flag: FlagName) -> legatio_common::Result<bool> {
        Ok(self
            .flags
            .read()
            .await
            .get(&(application_id.to_string(), flag))
            .copied()
            .unwrap_or(false))
    }

    async fn set(
        &self,
        application_id: &str,
        flag: FlagName,
        value: bool,
    ) -> legatio_common::Result<()> {
        self.flags
            .write()
            .await
            .insert((application_id.to_string(), flag), value);
        Ok(())
    }
}
