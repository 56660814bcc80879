//! Visa application vocabulary shared by all Legatio crates
//!
//! Wire names are snake_case and match the portal backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Visa category an application is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisaType {
    Tourist,
    Business,
    Student,
    Work,
    FamilyVisit,
    Transit,
}

impl VisaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisaType::Tourist => "tourist",
            VisaType::Business => "business",
            VisaType::Student => "student",
            VisaType::Work => "work",
            VisaType::FamilyVisit => "family_visit",
            VisaType::Transit => "transit",
        }
    }

    /// Baseline processing time in days before status adjustment
    pub fn base_processing_days(&self) -> u32 {
        match self {
            VisaType::Tourist => 7,
            VisaType::Business => 10,
            VisaType::Student => 21,
            VisaType::Work => 30,
            VisaType::FamilyVisit => 14,
            VisaType::Transit => 3,
        }
    }
}

impl fmt::Display for VisaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tourist" => Ok(VisaType::Tourist),
            "business" => Ok(VisaType::Business),
            "student" => Ok(VisaType::Student),
            "work" => Ok(VisaType::Work),
            "family_visit" => Ok(VisaType::FamilyVisit),
            "transit" => Ok(VisaType::Transit),
            other => Err(Error::InvalidInput(format!("Unknown visa type: {}", other))),
        }
    }
}

/// Kind of supporting document an applicant can upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Passport,
    Photo,
    BankStatement,
    InvitationLetter,
    TravelInsurance,
    EmploymentLetter,
    FlightItinerary,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Passport => "passport",
            DocumentType::Photo => "photo",
            DocumentType::BankStatement => "bank_statement",
            DocumentType::InvitationLetter => "invitation_letter",
            DocumentType::TravelInsurance => "travel_insurance",
            DocumentType::EmploymentLetter => "employment_letter",
            DocumentType::FlightItinerary => "flight_itinerary",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passport" => Ok(DocumentType::Passport),
            "photo" => Ok(DocumentType::Photo),
            "bank_statement" => Ok(DocumentType::BankStatement),
            "invitation_letter" => Ok(DocumentType::InvitationLetter),
            "travel_insurance" => Ok(DocumentType::TravelInsurance),
            "employment_letter" => Ok(DocumentType::EmploymentLetter),
            "flight_itinerary" => Ok(DocumentType::FlightItinerary),
            other => Err(Error::InvalidInput(format!("Unknown document type: {}", other))),
        }
    }
}

/// Application status as reported by the portal backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    DocumentReview,
    BackgroundCheck,
    OfficerReview,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::DocumentReview => "document_review",
            ApplicationStatus::BackgroundCheck => "background_check",
            ApplicationStatus::OfficerReview => "officer_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// Approved and rejected applications are decided and never move again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Rejected)
    }

    /// Share of the baseline processing time still ahead at this status
    pub fn remaining_time_multiplier(&self) -> f64 {
        match self {
            ApplicationStatus::Submitted => 1.0,
            ApplicationStatus::DocumentReview => 0.8,
            ApplicationStatus::BackgroundCheck => 0.6,
            ApplicationStatus::OfficerReview => 0.3,
            ApplicationStatus::Approved | ApplicationStatus::Rejected => 0.0,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated days until a decision, never less than one
pub fn estimated_processing_days(visa_type: VisaType, status: ApplicationStatus) -> u32 {
    let base = visa_type.base_processing_days() as f64;
    let days = (base * status.remaining_time_multiplier()) as u32;
    days.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_wire_names_round_trip_through_from_str() {
        for doc in [
            DocumentType::Passport,
            DocumentType::Photo,
            DocumentType::BankStatement,
            DocumentType::InvitationLetter,
            DocumentType::TravelInsurance,
            DocumentType::EmploymentLetter,
            DocumentType::FlightItinerary,
        ] {
            assert_eq!(doc.as_str().parse::<DocumentType>().unwrap(), doc);
            let json = serde_json::to_string(&doc).unwrap();
            assert_eq!(json, format!("\"{}\"", doc.as_str()));
        }
    }

    #[test]
    fn test_unknown_visa_type_is_invalid_input() {
        let err = "diplomatic".parse::<VisaType>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ApplicationStatus::Approved.is_terminal());
        assert!(ApplicationStatus::Rejected.is_terminal());
        assert!(!ApplicationStatus::OfficerReview.is_terminal());
        assert!(!ApplicationStatus::Submitted.is_terminal());
    }

    #[test]
    fn test_estimated_processing_days() {
        assert_eq!(estimated_processing_days(VisaType::Student, ApplicationStatus::Submitted), 21);
        assert_eq!(
            estimated_processing_days(VisaType::Business, ApplicationStatus::DocumentReview),
            8
        );
        assert_eq!(estimated_processing_days(VisaType::Work, ApplicationStatus::OfficerReview), 9);
        // Floors at one day even when decided
        assert_eq!(estimated_processing_days(VisaType::Transit, ApplicationStatus::Approved), 1);
        assert_eq!(
            estimated_processing_days(VisaType::Transit, ApplicationStatus::OfficerReview),
            1
        );
    }
}
