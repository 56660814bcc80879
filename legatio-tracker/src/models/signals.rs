//! Gate signals and the provider-side records they are derived from

use legatio_common::{ApplicationStatus, DocumentType, VisaType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Raw completion signals the gate evaluator consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSignals {
    pub mandatory_docs_required: usize,
    pub mandatory_docs_uploaded: usize,
    pub biometric_done: bool,
    pub payment_done: bool,
    pub backend_status: ApplicationStatus,
}

impl GateSignals {
    /// Signals of a freshly submitted application with nothing collected
    pub fn submitted(mandatory_docs_required: usize) -> Self {
        Self {
            mandatory_docs_required,
            mandatory_docs_uploaded: 0,
            biometric_done: false,
            payment_done: false,
            backend_status: ApplicationStatus::Submitted,
        }
    }

    pub fn documents_satisfied(&self) -> bool {
        self.mandatory_docs_uploaded >= self.mandatory_docs_required
    }
}

/// Documents a visa type requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequirements {
    pub mandatory: Vec<DocumentType>,
    pub optional: Vec<DocumentType>,
}

impl DocumentRequirements {
    /// Default requirement catalog of the portal
    pub fn for_visa_type(visa_type: VisaType) -> Self {
        use DocumentType::*;
        let (mandatory, optional) = match visa_type {
            VisaType::Business => (
                vec![Passport, InvitationLetter],
                vec![EmploymentLetter, BankStatement],
            ),
            VisaType::Tourist => (
                vec![Passport, BankStatement],
                vec![TravelInsurance, FlightItinerary, InvitationLetter],
            ),
            VisaType::Student => (
                vec![Passport, InvitationLetter, BankStatement],
                vec![EmploymentLetter],
            ),
            VisaType::Work => (
                vec![Passport, EmploymentLetter, InvitationLetter],
                vec![BankStatement],
            ),
            VisaType::FamilyVisit => (
                vec![Passport, InvitationLetter],
                vec![BankStatement, EmploymentLetter],
            ),
            VisaType::Transit => (vec![Passport, FlightItinerary], vec![]),
        };
        Self { mandatory, optional }
    }

    pub fn is_mandatory(&self, document_type: DocumentType) -> bool {
        self.mandatory.contains(&document_type)
    }

    /// Count distinct mandatory types covered by `uploaded`
    pub fn mandatory_covered<'a>(
        &self,
        uploaded: impl IntoIterator<Item = &'a DocumentType>,
    ) -> usize {
        let uploaded: BTreeSet<&DocumentType> = uploaded.into_iter().collect();
        let mandatory: BTreeSet<&DocumentType> = self.mandatory.iter().collect();
        mandatory.intersection(&uploaded).count()
    }
}

/// Document on file for an application, as the backend reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_type: DocumentType,
    pub verified: bool,
}

/// Persisted applicant completion flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagName {
    BiometricDone,
    PaymentDone,
}

impl FlagName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagName::BiometricDone => "biometric_done",
            FlagName::PaymentDone => "payment_done",
        }
    }
}

impl fmt::Display for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagName {
    type Err = legatio_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "biometric_done" => Ok(FlagName::BiometricDone),
            "payment_done" => Ok(FlagName::PaymentDone),
            other => Err(legatio_common::Error::InvalidInput(format!(
                "Unknown flag: {}",
                other
            ))),
        }
    }
}
