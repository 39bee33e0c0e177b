//! Top-level synchronizer: runs the three loops side by side.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use berth_core::config::RetryPolicy;
use berth_core::{HostRecord, KeyLayout, LeasePolicy, Settings};
use berth_registry::RegistryClient;
use berth_runtime::RuntimeObserver;

use crate::applier::EventApplier;
use crate::error::{SyncError, SyncResult};
use crate::machine::MachineRegistrar;
use crate::reconciler::ContainerReconciler;
use crate::registrar::Registrar;

/// Tunables shared by the loops.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub registry_root: String,
    pub machine_lease: LeasePolicy,
    pub container_lease: LeasePolicy,
    pub retry: RetryPolicy,
}

impl SyncOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            registry_root: settings.registry_root.clone(),
            machine_lease: settings.machine_lease,
            container_lease: settings.container_lease,
            retry: settings.retry,
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            registry_root: "/docker".to_string(),
            machine_lease: LeasePolicy::machine(),
            container_lease: LeasePolicy::container(),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Synchronizer {
    machine: Arc<MachineRegistrar>,
    reconciler: Arc<ContainerReconciler>,
    applier: Arc<EventApplier>,
}

impl Synchronizer {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        runtime: Arc<dyn RuntimeObserver>,
        host: HostRecord,
        options: SyncOptions,
    ) -> SyncResult<Self> {
        let layout = KeyLayout::new(&options.registry_root, &host.host_id);
        let machine = MachineRegistrar::new(
            registry.clone(),
            host,
            &layout,
            options.machine_lease,
            options.retry,
        )?;
        let registrar = Registrar::new(registry, runtime, layout, options.container_lease);

        Ok(Self {
            machine: Arc::new(machine),
            reconciler: Arc::new(ContainerReconciler::new(registrar.clone(), options.retry)),
            applier: Arc::new(EventApplier::new(registrar, options.retry)),
        })
    }

    pub fn machine(&self) -> &MachineRegistrar {
        &self.machine
    }

    pub fn reconciler(&self) -> &ContainerReconciler {
        &self.reconciler
    }

    /// Run until shutdown or until any loop fails fatally.
    ///
    /// The first fatal error aborts the remaining loops and is returned. A
    /// loop that ends cleanly (the event stream closing) leaves the others
    /// running.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> SyncResult<()> {
        info!(
            host_id = %self.machine.record().host_id,
            machine_key = %self.machine.key(),
            "synchronizer starting"
        );

        let mut tasks = JoinSet::new();
        {
            let machine = self.machine.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move { ("machine heartbeat", machine.run(shutdown).await) });
        }
        {
            let reconciler = self.reconciler.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                ("container reconciliation", reconciler.run(shutdown).await)
            });
        }
        {
            let applier = self.applier.clone();
            tasks.spawn(async move { ("event applier", applier.run(shutdown).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((task, Ok(()))) => info!(task, "sync loop finished"),
                Ok((task, Err(e))) => {
                    error!(task, error = %e, "sync loop failed, stopping synchronizer");
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, "sync task panicked or was cancelled");
                    tasks.abort_all();
                    return Err(SyncError::Task(e.to_string()));
                }
            }
        }

        info!("synchronizer stopped");
        Ok(())
    }
}
