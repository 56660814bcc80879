//! # Legatio Common Library
//!
//! Shared code for Legatio services including:
//! - Error type
//! - Visa application vocabulary (visa types, document types, statuses)
//! - Event types (PortalEvent) and EventBus
//! - Bootstrap configuration loading
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod visa;

pub use error::{Error, Result};
pub use visa::{ApplicationStatus, DocumentType, VisaType};
