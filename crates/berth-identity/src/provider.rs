//! Host identity provider trait and fallback resolution.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tracing::{info, warn};

use berth_core::HostRecord;
use berth_core::http::HttpError;

pub type IdentityResult<T> = Result<T, IdentityError>;

pub type IdentityFuture<'a, T> = Pin<Box<dyn Future<Output = IdentityResult<T>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("metadata service returned {status} for {path}")]
    Status { status: u16, path: String },

    #[error("metadata does not contain a host identifier ({0})")]
    MissingHostId(&'static str),

    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Resolves the identity of the current host.
pub trait HostIdentityProvider: Send + Sync {
    fn resolve(&self) -> IdentityFuture<'_, HostRecord>;
}

/// A fixed identifier with empty metadata.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    host_id: String,
}

impl StaticIdentity {
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
        }
    }
}

impl HostIdentityProvider for StaticIdentity {
    fn resolve(&self) -> IdentityFuture<'_, HostRecord> {
        let record = HostRecord::bare(self.host_id.clone());
        Box::pin(async move { Ok(record) })
    }
}

/// Resolve the host record once, degrading to `{fallback_host_id, {}}`.
///
/// A failed lookup is not an error: the host still registers, just without
/// metadata.
pub async fn resolve_or_fallback(
    provider: &dyn HostIdentityProvider,
    fallback_host_id: &str,
) -> HostRecord {
    match provider.resolve().await {
        Ok(record) => {
            info!(host_id = %record.host_id, "host identity resolved");
            record
        }
        Err(e) => {
            warn!(
                error = %e,
                fallback = %fallback_host_id,
                "host identity lookup failed, using fallback identifier"
            );
            HostRecord::bare(fallback_host_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    impl HostIdentityProvider for FailingProvider {
        fn resolve(&self) -> IdentityFuture<'_, HostRecord> {
            Box::pin(async { Err(IdentityError::MissingHostId("publicHostname")) })
        }
    }

    #[tokio::test]
    async fn failure_falls_back_to_bare_record() {
        let record = resolve_or_fallback(&FailingProvider, "docker-01").await;
        assert_eq!(record.host_id, "docker-01");
        assert_eq!(record.metadata, serde_json::json!({}));
    }

    #[tokio::test]
    async fn success_is_passed_through() {
        let record = resolve_or_fallback(&StaticIdentity::new("edge-1"), "unused").await;
        assert_eq!(record.host_id, "edge-1");
    }
}
