//! Container reconciler: the self-healing path.
//!
//! Every `container_ttl - margin` it lists the running containers and
//! re-registers each one, recreating records lost to missed events or
//! registry outages. Every container in the listing is attempted: a failure
//! for one is recorded in the [`ReconcileReport`] and never blocks the rest.
//! Only a failed listing fails the pass.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use berth_core::ContainerId;
use berth_core::config::RetryPolicy;

use crate::error::SyncResult;
use crate::registrar::Registrar;
use crate::retry::{retry, sleep_or_shutdown};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Containers re-asserted, in listing order.
    pub registered: Vec<ContainerId>,
    /// Containers whose registration failed this pass.
    pub failed: Vec<ContainerFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerFailure {
    pub container_id: ContainerId,
    pub error: String,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ContainerReconciler {
    registrar: Registrar,
    retry: RetryPolicy,
}

impl ContainerReconciler {
    pub fn new(registrar: Registrar, retry: RetryPolicy) -> Self {
        Self { registrar, retry }
    }

    /// One pass over a single snapshot of running containers.
    pub async fn reconcile_once(&self) -> SyncResult<ReconcileReport> {
        let ids = self.registrar.runtime().list_running().await?;
        debug!(count = ids.len(), "reconciling running containers");

        let mut report = ReconcileReport::default();
        for id in ids {
            match self.registrar.register(&id).await {
                Ok(_) => report.registered.push(id),
                Err(e) => {
                    warn!(container_id = %id, error = %e, "container registration failed");
                    report.failed.push(ContainerFailure {
                        container_id: id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            "reconciliation pass complete"
        );
        Ok(report)
    }

    /// Reconciliation loop. Returns `Ok` on shutdown, `Err` when listing
    /// keeps failing after bounded retries.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> SyncResult<()> {
        let interval = self.registrar.lease().reassert_interval();
        info!(interval = ?interval, "container reconciliation loop started");

        loop {
            let pass = retry("container reconciliation", self.retry, &mut shutdown, || {
                self.reconcile_once()
            })
            .await?;
            if pass.is_none() || !sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }

        debug!("container reconciliation loop shutting down");
        Ok(())
    }
}
