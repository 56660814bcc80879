//! Test Helper Utilities
//!
//! Shared utilities for testing legatio-tracker

#![allow(dead_code)]

pub mod backend;
pub mod transport;

pub use backend::GatedBackend;
pub use transport::ManualTransport;

use legatio_tracker::models::{FileRef, UploadId, UploadStatus};
use legatio_tracker::services::UploadWorkerHandle;
use std::time::Duration;

pub const APP_ID: &str = "app-test-001";

pub fn file(name: &str) -> FileRef {
    FileRef::new(name, format!("/tmp/{}", name), 1024).with_mime_type("application/pdf")
}

/// Poll `check` every 10ms for up to 5s
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub async fn wait_for_status(handle: &UploadWorkerHandle, id: UploadId, status: UploadStatus) {
    for _ in 0..500 {
        if handle.get(id).await.map(|item| item.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let actual = handle.get(id).await.map(|item| item.status);
    panic!("upload {} never reached {:?} (is {:?})", id, status, actual);
}
