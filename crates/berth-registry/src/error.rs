//! Error types for registry operations.

use thiserror::Error;

use berth_core::http::HttpError;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur talking to the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no registry endpoint reachable: {0}")]
    Unreachable(String),

    #[error("invalid registry key {0:?}")]
    InvalidKey(String),

    #[error("registry returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed registry response: {0}")]
    Decode(String),

    #[error(transparent)]
    Http(#[from] HttpError),
}
