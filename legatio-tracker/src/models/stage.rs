//! Application pipeline stages and their derived view
//!
//! SUBMITTED → DOCUMENT_COLLECTION → BIOMETRIC_COLLECTION → PAYMENT
//! → OFFICER_REVIEW → DECISION

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Submitted,
    DocumentCollection,
    BiometricCollection,
    Payment,
    OfficerReview,
    Decision,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Submitted => "submitted",
            StageId::DocumentCollection => "document_collection",
            StageId::BiometricCollection => "biometric_collection",
            StageId::Payment => "payment",
            StageId::OfficerReview => "officer_review",
            StageId::Decision => "decision",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage definition shown to the applicant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub title: String,
    pub description: String,
    /// Position in the pipeline, 1-based
    pub order: u8,
}

impl Stage {
    pub fn new(id: StageId, title: &str, description: &str, order: u8) -> Self {
        Self {
            id,
            title: title.to_string(),
            description: description.to_string(),
            order,
        }
    }
}

/// The fixed six-stage pipeline
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(
            StageId::Submitted,
            "Application Submitted",
            "Your application form has been received",
            1,
        ),
        Stage::new(
            StageId::DocumentCollection,
            "Document Collection",
            "Upload every mandatory supporting document",
            2,
        ),
        Stage::new(
            StageId::BiometricCollection,
            "Biometric Collection",
            "Provide fingerprints and photo at a collection point",
            3,
        ),
        Stage::new(
            StageId::Payment,
            "Fee Payment",
            "Pay the visa processing fee",
            4,
        ),
        Stage::new(
            StageId::OfficerReview,
            "Officer Review",
            "An embassy officer is reviewing your application",
            5,
        ),
        Stage::new(
            StageId::Decision,
            "Decision",
            "A final decision has been issued",
            6,
        ),
    ]
}

/// Per-stage flags derived from gate signals
///
/// Invariants: at most one view is `current`; `blocked` implies `current`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedStageView {
    pub stage: Stage,
    pub completed: bool,
    pub current: bool,
    pub blocked: bool,
}

/// Applicant actions enabled by the current gate state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableActions {
    pub upload_documents: bool,
    pub capture_biometrics: bool,
    pub make_payment: bool,
}

/// Full derived view of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub stages: Vec<DerivedStageView>,
    pub completed_count: usize,
    pub total_stages: usize,
    /// completed_count / total_stages, rounded half up to a whole percent
    pub progress_percent: u8,
    pub actions: AvailableActions,
}

impl PipelineSnapshot {
    pub fn view(&self, id: StageId) -> Option<&DerivedStageView> {
        self.stages.iter().find(|v| v.stage.id == id)
    }

    pub fn current_stage(&self) -> Option<&DerivedStageView> {
        self.stages.iter().find(|v| v.current)
    }

    pub fn is_complete(&self) -> bool {
        self.total_stages > 0 && self.completed_count == self.total_stages
    }
}
