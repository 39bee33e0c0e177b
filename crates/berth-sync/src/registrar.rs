//! Registration operation shared by the reconciler and the event applier.
//!
//! Stateless: nothing remembers which containers are registered. A record
//! lives exactly as long as its TTL unless re-asserted or deleted.

use std::sync::Arc;

use tracing::info;

use berth_core::{ContainerId, KeyLayout, LeasePolicy};
use berth_registry::RegistryClient;
use berth_runtime::RuntimeObserver;

use crate::error::{SyncError, SyncResult};

/// Registers and deregisters container records.
///
/// Cheap to clone; clones share the collaborator handles.
#[derive(Clone)]
pub struct Registrar {
    registry: Arc<dyn RegistryClient>,
    runtime: Arc<dyn RuntimeObserver>,
    layout: KeyLayout,
    lease: LeasePolicy,
}

impl Registrar {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        runtime: Arc<dyn RuntimeObserver>,
        layout: KeyLayout,
        lease: LeasePolicy,
    ) -> Self {
        Self {
            registry,
            runtime,
            layout,
            lease,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn RuntimeObserver> {
        &self.runtime
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn lease(&self) -> LeasePolicy {
        self.lease
    }

    /// Fetch the container's current descriptor and write it with the
    /// container TTL. Nothing is written if the descriptor is unavailable.
    pub async fn register(&self, id: &ContainerId) -> SyncResult<u64> {
        let descriptor = self
            .runtime
            .fetch_descriptor(id)
            .await?
            .ok_or_else(|| SyncError::DescriptorUnavailable(id.clone()))?;

        let key = self.layout.container_key(id);
        let ttl = self.lease.ttl();
        let version = self.registry.set(&key, &descriptor, ttl).await?;
        info!(container_id = %id, %key, ttl = ?ttl, version, "container registered");
        Ok(version)
    }

    /// Delete the container's record. Deleting an absent record succeeds.
    pub async fn deregister(&self, id: &ContainerId) -> SyncResult<()> {
        let key = self.layout.container_key(id);
        self.registry.delete(&key, true).await?;
        info!(container_id = %id, %key, "container deregistered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_registry::{MemoryRegistry, RegistryOp};
    use berth_runtime::MemoryRuntime;

    fn setup() -> (Registrar, MemoryRegistry, MemoryRuntime) {
        let registry = MemoryRegistry::new();
        let runtime = MemoryRuntime::new();
        let registrar = Registrar::new(
            Arc::new(registry.clone()),
            Arc::new(runtime.clone()),
            KeyLayout::new("/docker", "host-a"),
            LeasePolicy::container(),
        );
        (registrar, registry, runtime)
    }

    const KEY_C1: &str = "/docker/machines/host-a/containers/c1";

    #[tokio::test]
    async fn register_writes_descriptor_with_container_ttl() {
        let (registrar, registry, runtime) = setup();
        runtime.start("c1", r#"{"Id":"c1"}"#);

        registrar.register(&ContainerId::new("c1")).await.unwrap();

        assert_eq!(registry.get(KEY_C1).unwrap().as_ref(), br#"{"Id":"c1"}"#);
        assert_eq!(
            registry.operations(),
            vec![RegistryOp::Set {
                key: KEY_C1.to_string(),
                ttl: std::time::Duration::from_secs(60),
            }]
        );
    }

    #[tokio::test]
    async fn register_twice_is_idempotent() {
        let (registrar, registry, runtime) = setup();
        runtime.start("c1", r#"{"Id":"c1"}"#);
        let id = ContainerId::new("c1");

        registrar.register(&id).await.unwrap();
        let after_once = (registry.keys(), registry.get(KEY_C1));
        registrar.register(&id).await.unwrap();
        let after_twice = (registry.keys(), registry.get(KEY_C1));

        assert_eq!(after_once, after_twice);
    }

    #[tokio::test]
    async fn register_without_descriptor_writes_nothing() {
        let (registrar, registry, _runtime) = setup();

        let err = registrar.register(&ContainerId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, SyncError::DescriptorUnavailable(_)));
        assert!(registry.operations().is_empty());
    }

    #[tokio::test]
    async fn register_with_failing_fetch_writes_nothing() {
        let (registrar, registry, runtime) = setup();
        runtime.start("c1", "{}");
        runtime.break_descriptor("c1");

        let err = registrar.register(&ContainerId::new("c1")).await.unwrap_err();
        assert!(matches!(err, SyncError::Runtime(_)));
        assert!(registry.operations().is_empty());
    }

    #[tokio::test]
    async fn deregister_absent_key_is_noop_success() {
        let (registrar, registry, _runtime) = setup();

        registrar.deregister(&ContainerId::new("c1")).await.unwrap();
        assert!(registry.keys().is_empty());
        assert_eq!(
            registry.operations(),
            vec![RegistryOp::Delete {
                key: KEY_C1.to_string(),
                recursive: true,
            }]
        );
    }

    #[tokio::test]
    async fn registry_failure_propagates() {
        let (registrar, registry, runtime) = setup();
        runtime.start("c1", "{}");
        registry.fail_next(1);

        let err = registrar.register(&ContainerId::new("c1")).await.unwrap_err();
        assert!(matches!(err, SyncError::Registry(_)));
    }
}
