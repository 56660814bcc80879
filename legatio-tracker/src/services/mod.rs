//! Service modules for the application tracker
//!
//! Upload side: queue → worker → transport.
//! Progress side: providers → status poller → progress model → gate evaluator.

pub mod gate_evaluator;
pub mod progress_model;
pub mod providers;
pub mod status_poller;
pub mod transport;
pub mod upload_queue;
pub mod upload_worker;

pub use gate_evaluator::{evaluate, evaluate_stages};
pub use progress_model::{ApplicationProgressModel, FetchedSignals};
pub use providers::{FlagStore, InMemoryBackend, InMemoryFlagStore, PortalBackend, ProviderError};
pub use status_poller::{PollOutcome, PublishedSnapshot, StatusPoller, StatusPollerConfig};
pub use transport::{
    DocumentTransport, ProgressReport, ProgressReporter, SimulatedTransport, TransferError,
    TransferRequest,
};
pub use upload_queue::{QueueConfig, UploadQueueManager};
pub use upload_worker::{UploadCompletion, UploadWorker, UploadWorkerConfig, UploadWorkerHandle};
