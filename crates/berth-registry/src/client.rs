//! The registry client trait.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::RegistryResult;

/// Boxed future returned by [`RegistryClient`] operations.
pub type RegistryFuture<'a, T> = Pin<Box<dyn Future<Output = RegistryResult<T>> + Send + 'a>>;

/// TTL-aware key-value store used for discovery.
///
/// Implementations must be safe for concurrent use by several loops.
/// Both operations are idempotent against the store.
pub trait RegistryClient: Send + Sync {
    /// Write `value` under `key`, expiring after `ttl`. Returns the store's
    /// version for the write.
    fn set<'a>(&'a self, key: &'a str, value: &'a [u8], ttl: Duration)
    -> RegistryFuture<'a, u64>;

    /// Remove `key` (and its children when `recursive`). Deleting a key that
    /// does not exist succeeds.
    fn delete<'a>(&'a self, key: &'a str, recursive: bool) -> RegistryFuture<'a, ()>;
}
