//! In-memory runtime observer.
//!
//! Holds a table of "running" containers with their descriptors and a queue
//! of scripted event streams. Each call to `stream_events` takes the next
//! queued stream; the test feeds it through the returned sender, and dropping
//! the sender closes the stream cleanly.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::mpsc;

use berth_core::{ContainerId, LifecycleEvent};

use crate::error::{RuntimeError, RuntimeResult};
use crate::observer::{EventStream, RuntimeFuture, RuntimeObserver};

/// Sender side of a scripted event stream.
pub type EventFeed = mpsc::UnboundedSender<RuntimeResult<LifecycleEvent>>;

#[derive(Debug, Default)]
struct Inner {
    /// Running containers in start order.
    running: Vec<(ContainerId, Bytes)>,
    broken_descriptors: HashSet<ContainerId>,
    listing_failures: usize,
    streams: VecDeque<mpsc::UnboundedReceiver<RuntimeResult<LifecycleEvent>>>,
    streams_opened: usize,
}

/// Thread-safe fake runtime. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuntime {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark a container as running with the given descriptor.
    pub fn start(&self, id: impl Into<ContainerId>, descriptor: impl Into<Bytes>) {
        let id = id.into();
        let descriptor = descriptor.into();
        let mut inner = self.lock();
        match inner.running.iter_mut().find(|(c, _)| *c == id) {
            Some(entry) => entry.1 = descriptor,
            None => inner.running.push((id, descriptor)),
        }
    }

    /// Remove a container; its descriptor is no longer available.
    pub fn remove(&self, id: &ContainerId) {
        self.lock().running.retain(|(c, _)| c != id);
    }

    /// Make descriptor fetches for `id` fail until cleared.
    pub fn break_descriptor(&self, id: impl Into<ContainerId>) {
        self.lock().broken_descriptors.insert(id.into());
    }

    pub fn repair_descriptor(&self, id: &ContainerId) {
        self.lock().broken_descriptors.remove(id);
    }

    /// Make the next `count` listings fail.
    pub fn fail_listings(&self, count: usize) {
        self.lock().listing_failures = count;
    }

    /// Queue a new event stream and return its feed.
    pub fn queue_stream(&self) -> EventFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().streams.push_back(rx);
        tx
    }

    /// Number of event streams handed out so far.
    pub fn streams_opened(&self) -> usize {
        self.lock().streams_opened
    }

    fn list(&self) -> RuntimeResult<Vec<ContainerId>> {
        let mut inner = self.lock();
        if inner.listing_failures > 0 {
            inner.listing_failures -= 1;
            return Err(RuntimeError::Unavailable("injected listing failure".to_string()));
        }
        Ok(inner.running.iter().map(|(id, _)| id.clone()).collect())
    }

    fn descriptor(&self, id: &ContainerId) -> RuntimeResult<Option<Bytes>> {
        let inner = self.lock();
        if inner.broken_descriptors.contains(id) {
            return Err(RuntimeError::Status {
                status: 500,
                path: format!("/containers/{id}/json"),
                message: "injected descriptor failure".to_string(),
            });
        }
        Ok(inner
            .running
            .iter()
            .find(|(c, _)| c == id)
            .map(|(_, d)| d.clone()))
    }

    fn open_stream(&self) -> RuntimeResult<Box<dyn EventStream>> {
        let mut inner = self.lock();
        let rx = inner
            .streams
            .pop_front()
            .ok_or_else(|| RuntimeError::Unavailable("no event stream queued".to_string()))?;
        inner.streams_opened += 1;
        Ok(Box::new(ChannelStream { rx }))
    }
}

impl RuntimeObserver for MemoryRuntime {
    fn list_running(&self) -> RuntimeFuture<'_, Vec<ContainerId>> {
        let result = self.list();
        Box::pin(async move { result })
    }

    fn fetch_descriptor<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, Option<Bytes>> {
        let result = self.descriptor(id);
        Box::pin(async move { result })
    }

    fn stream_events(&self) -> RuntimeFuture<'_, Box<dyn EventStream>> {
        let result = self.open_stream();
        Box::pin(async move { result })
    }
}

struct ChannelStream {
    rx: mpsc::UnboundedReceiver<RuntimeResult<LifecycleEvent>>,
}

impl EventStream for ChannelStream {
    fn next_event(&mut self) -> RuntimeFuture<'_, Option<LifecycleEvent>> {
        Box::pin(async move { self.rx.recv().await.transpose() })
    }
}
