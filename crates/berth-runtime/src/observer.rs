//! Runtime observer traits.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use berth_core::{ContainerId, LifecycleEvent};

use crate::error::RuntimeResult;

/// Boxed future returned by runtime operations.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = RuntimeResult<T>> + Send + 'a>>;

/// Read-only view of the container runtime.
///
/// Implementations are shared between the reconciler and the event applier
/// and must be safe for concurrent use.
pub trait RuntimeObserver: Send + Sync {
    /// Ids of all currently running containers, in runtime order.
    fn list_running(&self) -> RuntimeFuture<'_, Vec<ContainerId>>;

    /// The container's current descriptor. `Ok(None)` when the runtime does
    /// not know the container (already removed).
    fn fetch_descriptor<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, Option<Bytes>>;

    /// Open a fresh lifecycle event stream. Streams are not restartable.
    fn stream_events(&self) -> RuntimeFuture<'_, Box<dyn EventStream>>;
}

/// A live, ordered stream of lifecycle events.
pub trait EventStream: Send {
    /// Next event in arrival order; `Ok(None)` once the source closed cleanly.
    fn next_event(&mut self) -> RuntimeFuture<'_, Option<LifecycleEvent>>;
}
