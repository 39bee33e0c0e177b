//! Synchronizer error types.

use thiserror::Error;

use berth_core::ContainerId;
use berth_registry::RegistryError;
use berth_runtime::RuntimeError;

/// Errors surfaced by the registration operation and the sync loops.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("no descriptor available for container {0}")]
    DescriptorUnavailable(ContainerId),

    #[error("failed to serialize host record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last_error: String,
    },

    #[error("sync task failed: {0}")]
    Task(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
