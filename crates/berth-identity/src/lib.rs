//! berth-identity: who is this host?
//!
//! The machine registrar needs a stable host identifier and an opaque
//! metadata blob. [`Ec2MetadataProvider`] reads both from the EC2 instance
//! metadata service; [`StaticIdentity`] returns a configured identifier.
//! [`resolve_or_fallback`] turns any provider failure into a degraded record
//! (fallback identifier, empty metadata) instead of an error.

pub mod ec2;
pub mod provider;

pub use ec2::Ec2MetadataProvider;
pub use provider::{
    HostIdentityProvider, IdentityError, IdentityFuture, IdentityResult, StaticIdentity,
    resolve_or_fallback,
};
