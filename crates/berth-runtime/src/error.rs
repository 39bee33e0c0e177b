//! Runtime observer error types.

use thiserror::Error;

use berth_core::http::HttpError;

/// Result type alias for runtime observer operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur querying the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime returned {status} for {path}: {message}")]
    Status {
        status: u16,
        path: String,
        message: String,
    },

    #[error("malformed runtime payload: {0}")]
    Decode(String),

    #[error("event stream failed: {0}")]
    Stream(String),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Http(#[from] HttpError),
}
