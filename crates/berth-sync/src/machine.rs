//! Machine registrar: keeps the host presence record alive.
//!
//! Writes the host metadata under `<root>/machines/<host>/awsinfo` with the
//! machine TTL, then sleeps `ttl - margin` and writes again. A write that
//! keeps failing after bounded retries ends the loop with an error: a host
//! that cannot assert its presence stops claiming it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use berth_core::config::RetryPolicy;
use berth_core::{HostRecord, KeyLayout, LeasePolicy};
use berth_registry::RegistryClient;

use crate::error::SyncResult;
use crate::retry::{retry, sleep_or_shutdown};

pub struct MachineRegistrar {
    registry: Arc<dyn RegistryClient>,
    record: HostRecord,
    key: String,
    /// Serialized metadata, computed once.
    value: Vec<u8>,
    lease: LeasePolicy,
    retry: RetryPolicy,
}

impl MachineRegistrar {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        record: HostRecord,
        layout: &KeyLayout,
        lease: LeasePolicy,
        retry: RetryPolicy,
    ) -> SyncResult<Self> {
        let value = record.to_value()?;
        Ok(Self {
            registry,
            key: layout.machine_key(),
            record,
            value,
            lease,
            retry,
        })
    }

    pub fn record(&self) -> &HostRecord {
        &self.record
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write the presence record once.
    pub async fn assert_presence(&self) -> SyncResult<u64> {
        let ttl = self.lease.ttl();
        let version = self.registry.set(&self.key, &self.value, ttl).await?;
        info!(host_id = %self.record.host_id, key = %self.key, ttl = ?ttl, version, "machine registered");
        Ok(version)
    }

    /// Heartbeat loop. Returns `Ok` on shutdown, `Err` when retries are exhausted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> SyncResult<()> {
        let interval = self.lease.reassert_interval();
        info!(key = %self.key, interval = ?interval, "machine heartbeat loop started");

        loop {
            let written = retry("machine heartbeat", self.retry, &mut shutdown, || {
                self.assert_presence()
            })
            .await?;
            if written.is_none() || !sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }

        debug!(key = %self.key, "machine heartbeat loop shutting down");
        Ok(())
    }
}
