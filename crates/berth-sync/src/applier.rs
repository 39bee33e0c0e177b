//! Event applier: the low-latency path.
//!
//! Consumes the runtime's lifecycle stream in arrival order. `Start`
//! registers, `Stop` deregisters, everything else is ignored. A failed
//! registration is logged and the stream keeps flowing; the reconciler heals
//! it on its next pass. A broken stream is re-opened with backoff.

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use berth_core::config::RetryPolicy;
use berth_core::{EventKind, LifecycleEvent};
use berth_runtime::{EventStream, RuntimeResult};

use crate::error::{SyncError, SyncResult};
use crate::registrar::Registrar;
use crate::retry::{Backoff, sleep_or_shutdown, until_shutdown};

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Registered,
    Deregistered,
    Ignored,
}

/// Why a stream stopped being consumed without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Closed,
    Shutdown,
}

pub struct EventApplier {
    registrar: Registrar,
    retry: RetryPolicy,
}

impl EventApplier {
    pub fn new(registrar: Registrar, retry: RetryPolicy) -> Self {
        Self { registrar, retry }
    }

    pub async fn apply(&self, event: &LifecycleEvent) -> SyncResult<Applied> {
        let id = &event.container_id;
        match &event.kind {
            EventKind::Start => {
                self.registrar.register(id).await?;
                Ok(Applied::Registered)
            }
            EventKind::Stop => {
                self.registrar.deregister(id).await?;
                Ok(Applied::Deregistered)
            }
            EventKind::Other(action) => {
                debug!(container_id = %id, action = %action, "ignoring lifecycle event");
                Ok(Applied::Ignored)
            }
        }
    }

    /// Apply events from `stream` until it ends, fails, or shutdown.
    async fn consume(
        &self,
        stream: &mut dyn EventStream,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut Backoff,
    ) -> RuntimeResult<StreamEnd> {
        loop {
            let event = match until_shutdown(stream.next_event(), shutdown).await {
                None => return Ok(StreamEnd::Shutdown),
                Some(Ok(None)) => return Ok(StreamEnd::Closed),
                Some(Ok(Some(event))) => event,
                Some(Err(e)) => return Err(e),
            };
            backoff.reset();

            match until_shutdown(self.apply(&event), shutdown).await {
                None => return Ok(StreamEnd::Shutdown),
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!(
                    container_id = %event.container_id,
                    kind = %event.kind,
                    error = %e,
                    "failed to apply lifecycle event"
                ),
            }
        }
    }

    /// Stream loop. Returns `Ok` on a clean end of stream or shutdown, `Err`
    /// when the stream cannot be kept open after bounded retries.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> SyncResult<()> {
        let mut backoff = Backoff::new(self.retry);
        info!("event applier started");

        loop {
            let Some(opened) =
                until_shutdown(self.registrar.runtime().stream_events(), &mut shutdown).await
            else {
                break;
            };

            let err = match opened {
                Ok(mut stream) => {
                    debug!("event stream opened");
                    match self
                        .consume(stream.as_mut(), &mut shutdown, &mut backoff)
                        .await
                    {
                        Ok(StreamEnd::Closed) => {
                            info!("event stream closed by runtime");
                            return Ok(());
                        }
                        Ok(StreamEnd::Shutdown) => break,
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            let Some(delay) = backoff.next_delay() else {
                error!(attempts = backoff.attempts(), error = %err, "event stream retries exhausted");
                return Err(SyncError::RetriesExhausted {
                    operation: "event stream",
                    attempts: backoff.attempts(),
                    last_error: err.to_string(),
                });
            };
            warn!(
                attempt = backoff.attempts(),
                retry_in = ?delay,
                error = %err,
                "event stream failed, reopening"
            );
            if !sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        debug!("event applier shutting down");
        Ok(())
    }
}
