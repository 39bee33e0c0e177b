//! berth-core: shared building blocks for the berth registration synchronizer.
//!
//! Holds the domain types passed between the runtime observer, the registry
//! client and the synchronizer loops, the deterministic registry key layout,
//! TTL lease policy, TOML configuration and a small HTTP/1.1 client helper
//! used by every network collaborator.

pub mod config;
pub mod http;
pub mod keys;
pub mod lease;
pub mod types;

pub use config::{BerthConfig, ConfigError, Settings};
pub use keys::KeyLayout;
pub use lease::LeasePolicy;
pub use types::*;
