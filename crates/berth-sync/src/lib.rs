//! berth-sync: keeps the registry in step with the containers on this host.
//!
//! Three independent loops. The reconciler and the event applier share one
//! stateless [`Registrar`]; the machine registrar writes the host record.
//!
//! ```text
//!   RuntimeObserver ──list/fetch──► ContainerReconciler ──┐
//!         │                          (every ttl - margin)  │
//!         └──lifecycle stream──────► EventApplier ─────────┼──► Registrar
//!                                    (Start / Stop)        │        │
//!                                                          │        ▼
//!   HostRecord ──────────────────► MachineRegistrar ───────┴─► RegistryClient
//!                                    (every ttl - margin)
//! ```
//!
//! Nothing is remembered between passes. Records survive only while they are
//! re-asserted; TTL expiry is the cleanup for hosts and containers that go
//! away without a stop event.

pub mod applier;
pub mod error;
pub mod machine;
pub mod reconciler;
pub mod registrar;
pub mod retry;
pub mod synchronizer;

pub use applier::{Applied, EventApplier};
pub use error::{SyncError, SyncResult};
pub use machine::MachineRegistrar;
pub use reconciler::{ContainerFailure, ContainerReconciler, ReconcileReport};
pub use registrar::Registrar;
pub use retry::Backoff;
pub use synchronizer::{SyncOptions, Synchronizer};
