//! berth-registry: the distributed key-value registry seen by berth.
//!
//! The synchronizer only needs two operations: write a value under a key with
//! a TTL, and delete a key. [`RegistryClient`] captures exactly that, so the
//! loops can run against etcd in production and against [`MemoryRegistry`]
//! in tests.
//!
//! # Implementations
//!
//! ```text
//! RegistryClient
//!   ├── EtcdClient      etcd v2 keys API, endpoints tried in order
//!   └── MemoryRegistry  BTreeMap with TTL expiry and an operation log
//! ```

pub mod client;
pub mod error;
pub mod etcd;
pub mod memory;

pub use client::{RegistryClient, RegistryFuture};
pub use error::{RegistryError, RegistryResult};
pub use etcd::EtcdClient;
pub use memory::{MemoryRegistry, RegistryOp};
