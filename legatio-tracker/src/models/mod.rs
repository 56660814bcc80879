//! Data models for legatio-tracker

pub mod signals;
pub mod stage;
pub mod upload_item;

pub use signals::{DocumentRecord, DocumentRequirements, FlagName, GateSignals};
pub use stage::{
    default_stages, AvailableActions, DerivedStageView, PipelineSnapshot, Stage, StageId,
};
pub use upload_item::{FileRef, TransferReceipt, UploadId, UploadItem, UploadStatus};
