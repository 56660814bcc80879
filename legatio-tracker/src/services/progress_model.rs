//! Application progress model
//!
//! Holds the latest raw signals for one application and evaluates them on
//! demand. Signals arrive from two directions: the status poller (backend
//! documents, status, persisted flags) and the upload pipeline (documents
//! that just finished uploading).

use crate::models::{
    default_stages, DocumentRecord, DocumentRequirements, GateSignals, PipelineSnapshot, Stage,
};
use crate::services::gate_evaluator;
use chrono::{DateTime, Utc};
use legatio_common::visa::estimated_processing_days;
use legatio_common::{ApplicationStatus, DocumentType, VisaType};
use std::collections::BTreeMap;
use tracing::debug;

/// Signals gathered by one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSignals {
    pub requirements: DocumentRequirements,
    pub documents: Vec<DocumentRecord>,
    pub status: ApplicationStatus,
    pub biometric_done: bool,
    pub payment_done: bool,
    /// [`ApplicationProgressModel::flags_version`] when the fetch started
    pub flags_version: u64,
}

/// Latest known state of one application
#[derive(Debug, Clone)]
pub struct ApplicationProgressModel {
    application_id: String,
    visa_type: VisaType,
    stages: Vec<Stage>,
    requirements: DocumentRequirements,
    /// Documents on file, by type, with their verification state
    documents: BTreeMap<DocumentType, bool>,
    biometric_done: bool,
    payment_done: bool,
    /// Bumped on every local flag change
    flags_version: u64,
    backend_status: ApplicationStatus,
    refreshed_at: Option<DateTime<Utc>>,
}

impl ApplicationProgressModel {
    /// Fresh application: default stages, catalog requirements, nothing on file
    pub fn new(application_id: impl Into<String>, visa_type: VisaType) -> Self {
        Self {
            application_id: application_id.into(),
            visa_type,
            stages: default_stages(),
            requirements: DocumentRequirements::for_visa_type(visa_type),
            documents: BTreeMap::new(),
            biometric_done: false,
            payment_done: false,
            flags_version: 0,
            backend_status: ApplicationStatus::Submitted,
            refreshed_at: None,
        }
    }

    pub fn with_stages(mut self, stages: Vec<Stage>) -> Self {
        self.stages = stages;
        self
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn visa_type(&self) -> VisaType {
        self.visa_type
    }

    pub fn requirements(&self) -> &DocumentRequirements {
        &self.requirements
    }

    pub fn backend_status(&self) -> ApplicationStatus {
        self.backend_status
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn flags_version(&self) -> u64 {
        self.flags_version
    }

    /// Documents on file in type order
    pub fn documents(&self) -> Vec<DocumentRecord> {
        self.documents
            .iter()
            .map(|(&document_type, &verified)| DocumentRecord {
                document_type,
                verified,
            })
            .collect()
    }

    /// Current gate signals
    ///
    /// A document counts toward the mandatory total once it is on file,
    /// verified or not; each mandatory type counts once.
    pub fn signals(&self) -> GateSignals {
        GateSignals {
            mandatory_docs_required: self.requirements.mandatory.len(),
            mandatory_docs_uploaded: self.requirements.mandatory_covered(self.documents.keys()),
            biometric_done: self.biometric_done,
            payment_done: self.payment_done,
            backend_status: self.backend_status,
        }
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        gate_evaluator::evaluate_stages(&self.stages, &self.signals())
    }

    pub fn estimated_processing_days(&self) -> u32 {
        estimated_processing_days(self.visa_type, self.backend_status)
    }

    /// Replace polled signals
    ///
    /// Documents are merged: a document recorded locally after an upload is
    /// kept even if the backend has not reported it yet. Polled flags are
    /// dropped if a flag was set locally after the fetch started.
    pub fn apply_poll(&mut self, fetched: FetchedSignals) {
        self.requirements = fetched.requirements;
        for record in fetched.documents {
            self.documents.insert(record.document_type, record.verified);
        }
        self.backend_status = fetched.status;
        if fetched.flags_version == self.flags_version {
            self.biometric_done = fetched.biometric_done;
            self.payment_done = fetched.payment_done;
        } else {
            debug!(
                application_id = %self.application_id,
                fetched = fetched.flags_version,
                local = self.flags_version,
                "Flags changed during poll, keeping local values"
            );
        }
        self.refreshed_at = Some(Utc::now());
    }

    /// Record a document that finished uploading
    ///
    /// Returns true if it covered a mandatory type not already on file.
    pub fn record_document(&mut self, document_type: DocumentType, verified: bool) -> bool {
        let newly_covered = self.requirements.is_mandatory(document_type)
            && !self.documents.contains_key(&document_type);
        let entry = self.documents.entry(document_type).or_insert(false);
        *entry = *entry || verified;
        debug!(
            application_id = %self.application_id,
            %document_type,
            verified,
            newly_covered,
            "Document recorded"
        );
        newly_covered
    }

    pub fn set_biometric_done(&mut self, done: bool) {
        self.biometric_done = done;
        self.flags_version += 1;
    }

    pub fn set_payment_done(&mut self, done: bool) {
        self.payment_done = done;
        self.flags_version += 1;
    }
}
