//! In-memory registry with TTL expiry.
//!
//! Mirrors the etcd semantics the synchronizer relies on: last write wins,
//! entries vanish once their TTL elapses, deletes of absent keys succeed and
//! recursive deletes remove a whole subtree. Expiry uses `tokio::time`, so
//! tests with a paused clock can advance past a lease deterministically.
//!
//! Every call is recorded in an operation log, and write failures can be
//! injected to exercise retry paths.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::debug;

use crate::client::{RegistryClient, RegistryFuture};
use crate::error::{RegistryError, RegistryResult};

/// One call made against a [`MemoryRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryOp {
    Set { key: String, ttl: Duration },
    Delete { key: String, recursive: bool },
}

#[derive(Debug)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    ops: Vec<RegistryOp>,
    next_version: u64,
    failures_left: usize,
}

impl Inner {
    fn purge_expired(&mut self, now: Instant) {
        self.entries.retain(|_, e| e.expires_at > now);
    }

    fn take_failure(&mut self) -> bool {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            true
        } else {
            false
        }
    }
}

/// Thread-safe in-memory registry. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current value of a live key.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut inner = self.lock();
        inner.purge_expired(Instant::now());
        inner.entries.get(key).map(|e| e.value.clone())
    }

    /// Whether a live entry exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remaining lifetime of a live key.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.purge_expired(now);
        inner.entries.get(key).map(|e| e.expires_at - now)
    }

    /// Version of the last write to a live key.
    pub fn version(&self, key: &str) -> Option<u64> {
        let mut inner = self.lock();
        inner.purge_expired(Instant::now());
        inner.entries.get(key).map(|e| e.version)
    }

    /// All live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut inner = self.lock();
        inner.purge_expired(Instant::now());
        inner.entries.keys().cloned().collect()
    }

    /// Every call made so far, in order.
    pub fn operations(&self) -> Vec<RegistryOp> {
        self.lock().ops.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().ops.clear();
    }

    /// Make the next `count` calls fail with [`RegistryError::Unreachable`].
    pub fn fail_next(&self, count: usize) {
        self.lock().failures_left = count;
    }

    /// Drop a key behind the synchronizer's back (simulates lost state).
    pub fn remove_external(&self, key: &str) {
        self.lock().entries.remove(key);
    }

    fn apply_set(&self, key: &str, value: &[u8], ttl: Duration) -> RegistryResult<u64> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.ops.push(RegistryOp::Set {
            key: key.to_string(),
            ttl,
        });
        if inner.take_failure() {
            return Err(RegistryError::Unreachable("injected failure".to_string()));
        }
        inner.purge_expired(now);
        inner.next_version += 1;
        let version = inner.next_version;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: Bytes::copy_from_slice(value),
                expires_at: now + ttl,
                version,
            },
        );
        debug!(%key, ttl = ?ttl, version, "memory registry set");
        Ok(version)
    }

    fn apply_delete(&self, key: &str, recursive: bool) -> RegistryResult<()> {
        let mut inner = self.lock();
        inner.ops.push(RegistryOp::Delete {
            key: key.to_string(),
            recursive,
        });
        if inner.take_failure() {
            return Err(RegistryError::Unreachable("injected failure".to_string()));
        }
        inner.entries.remove(key);
        if recursive {
            let prefix = format!("{}/", key.trim_end_matches('/'));
            inner.entries.retain(|k, _| !k.starts_with(&prefix));
        }
        debug!(%key, recursive, "memory registry delete");
        Ok(())
    }
}

impl RegistryClient for MemoryRegistry {
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
        ttl: Duration,
    ) -> RegistryFuture<'a, u64> {
        let result = self.apply_set(key, value, ttl);
        Box::pin(async move { result })
    }

    fn delete<'a>(&'a self, key: &'a str, recursive: bool) -> RegistryFuture<'a, ()> {
        let result = self.apply_delete(key, recursive);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let registry = MemoryRegistry::new();
        let version = registry
            .set("/docker/a", b"{}", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(version, 1);
        assert_eq!(registry.get("/docker/a").unwrap(), Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn repeated_set_overwrites() {
        let registry = MemoryRegistry::new();
        registry.set("/k", b"one", Duration::from_secs(60)).await.unwrap();
        registry.set("/k", b"two", Duration::from_secs(60)).await.unwrap();
        assert_eq!(registry.keys(), vec!["/k".to_string()]);
        assert_eq!(registry.get("/k").unwrap(), Bytes::from_static(b"two"));
        assert_eq!(registry.version("/k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let registry = MemoryRegistry::new();
        registry.set("/k", b"v", Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(registry.contains("/k"));
        assert_eq!(registry.ttl_remaining("/k"), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!registry.contains("/k"));
    }

    #[tokio::test(start_paused = true)]
    async fn rewrite_extends_lease() {
        let registry = MemoryRegistry::new();
        registry.set("/k", b"v", Duration::from_secs(60)).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        registry.set("/k", b"v", Duration::from_secs(60)).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(registry.contains("/k"));
    }

    #[tokio::test]
    async fn delete_absent_key_succeeds() {
        let registry = MemoryRegistry::new();
        registry.delete("/missing", true).await.unwrap();
        assert_eq!(
            registry.operations(),
            vec![RegistryOp::Delete {
                key: "/missing".to_string(),
                recursive: true
            }]
        );
    }

    #[tokio::test]
    async fn recursive_delete_removes_subtree() {
        let registry = MemoryRegistry::new();
        let ttl = Duration::from_secs(60);
        registry.set("/m/h/containers/a", b"1", ttl).await.unwrap();
        registry.set("/m/h/containers/b", b"2", ttl).await.unwrap();
        registry.set("/m/h/containersx", b"3", ttl).await.unwrap();

        registry.delete("/m/h/containers", true).await.unwrap();
        assert_eq!(registry.keys(), vec!["/m/h/containersx".to_string()]);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let registry = MemoryRegistry::new();
        registry.fail_next(1);
        assert!(registry.set("/k", b"v", Duration::from_secs(1)).await.is_err());
        assert!(registry.set("/k", b"v", Duration::from_secs(1)).await.is_ok());
        assert_eq!(registry.operations().len(), 2);
    }
}
