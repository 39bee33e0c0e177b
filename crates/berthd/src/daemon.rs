//! Wires the collaborators together and runs the subcommands.

use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::sync::watch;
use tracing::{error, info};

use berth_core::config::IdentitySource;
use berth_core::{HostRecord, Settings};
use berth_identity::{
    Ec2MetadataProvider, HostIdentityProvider, StaticIdentity, resolve_or_fallback,
};
use berth_registry::{EtcdClient, RegistryClient};
use berth_runtime::{DockerClient, RuntimeObserver};
use berth_sync::{SyncOptions, Synchronizer};

struct Collaborators {
    registry: Arc<dyn RegistryClient>,
    runtime: Arc<dyn RuntimeObserver>,
    host: HostRecord,
}

impl Collaborators {
    async fn connect(settings: &Settings) -> anyhow::Result<Self> {
        let registry = EtcdClient::new(&settings.registry_endpoints, settings.registry_timeout)
            .context("invalid registry endpoint")?;
        info!(endpoints = ?settings.registry_endpoints, root = %settings.registry_root, "registry client configured");

        let runtime = DockerClient::new(&settings.docker_socket, settings.runtime_timeout);
        info!(socket = ?settings.docker_socket, "runtime client configured");

        let provider: Box<dyn HostIdentityProvider> = match settings.identity {
            IdentitySource::Ec2 => Box::new(
                Ec2MetadataProvider::new(&settings.metadata_endpoint, settings.metadata_timeout)
                    .context("invalid metadata endpoint")?,
            ),
            IdentitySource::Static => Box::new(StaticIdentity::new(&settings.fallback_host_id)),
        };
        let host = resolve_or_fallback(provider.as_ref(), &settings.fallback_host_id).await;

        Ok(Self {
            registry: Arc::new(registry),
            runtime: Arc::new(runtime),
            host,
        })
    }

    fn synchronizer(self, settings: &Settings) -> anyhow::Result<Synchronizer> {
        Ok(Synchronizer::new(
            self.registry,
            self.runtime,
            self.host,
            SyncOptions::from_settings(settings),
        )?)
    }
}

/// `berthd run`: loops until Ctrl-C or a fatal error.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    info!("berthd starting");
    let synchronizer = Collaborators::connect(&settings)
        .await?
        .synchronizer(&settings)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sync_handle = tokio::spawn(synchronizer.run(shutdown_rx));

    let outcome = tokio::select! {
        joined = &mut sync_handle => joined,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to install Ctrl-C handler")?;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            sync_handle.await
        }
    };

    match outcome.context("synchronizer task failed")? {
        Ok(()) => {
            info!("berthd stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "synchronizer stopped with a fatal error");
            Err(e.into())
        }
    }
}

/// `berthd reconcile`: one machine write and one reconciliation pass.
pub async fn reconcile(settings: Settings) -> anyhow::Result<()> {
    let synchronizer = Collaborators::connect(&settings)
        .await?
        .synchronizer(&settings)?;

    synchronizer
        .machine()
        .assert_presence()
        .await
        .context("failed to register machine")?;
    let report = synchronizer
        .reconciler()
        .reconcile_once()
        .await
        .context("failed to list running containers")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_clean() {
        bail!(
            "{} of {} containers failed to register",
            report.failed.len(),
            report.failed.len() + report.registered.len()
        );
    }
    Ok(())
}
