//! berth.toml configuration parser.
//!
//! Every section and field is optional; [`BerthConfig::resolve`] fills in the
//! defaults, parses duration strings and validates lease policies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lease::{CONTAINER_TTL, LeasePolicy, MACHINE_TTL, SAFETY_MARGIN};

pub const DEFAULT_REGISTRY_ENDPOINTS: [&str; 2] =
    ["http://172.17.42.1:4001", "http://10.1.42.1:4001"];
pub const DEFAULT_REGISTRY_ROOT: &str = "/docker";
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://169.254.169.254/latest/meta-data";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BerthConfig {
    pub registry: Option<RegistryConfig>,
    pub runtime: Option<RuntimeConfig>,
    pub host: Option<HostConfig>,
    pub leases: Option<LeasesConfig>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub endpoints: Option<Vec<String>>,
    pub root: Option<String>,
    pub request_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub socket: Option<PathBuf>,
    pub request_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// `ec2` or `static`.
    pub identity: Option<String>,
    pub fallback_id: Option<String>,
    pub metadata_endpoint: Option<String>,
    /// Per-request timeout for the instance metadata service.
    pub request_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeasesConfig {
    pub machine_ttl: Option<String>,
    pub container_ttl: Option<String>,
    pub safety_margin: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    pub initial_backoff: Option<String>,
    pub max_backoff: Option<String>,
    pub max_attempts: Option<u32>,
}

/// Where the host identity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// EC2 instance metadata service.
    Ec2,
    /// The configured fallback identifier, no metadata.
    Static,
}

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Fully resolved and validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub registry_endpoints: Vec<String>,
    pub registry_root: String,
    pub registry_timeout: Duration,
    pub docker_socket: PathBuf,
    pub runtime_timeout: Duration,
    pub identity: IdentitySource,
    pub fallback_host_id: String,
    pub metadata_endpoint: String,
    pub metadata_timeout: Duration,
    pub machine_lease: LeasePolicy,
    pub container_lease: LeasePolicy,
    pub retry: RetryPolicy,
}

impl BerthConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve against the process environment.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        self.resolve_with_env(|name| std::env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup.
    ///
    /// The fallback host id defaults to `$DOCKER_HOST`, then `$HOSTNAME`,
    /// then `localhost`.
    pub fn resolve_with_env(
        self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Settings, ConfigError> {
        let registry = self.registry.unwrap_or_default();
        let runtime = self.runtime.unwrap_or_default();
        let host = self.host.unwrap_or_default();
        let leases = self.leases.unwrap_or_default();
        let retry = self.retry.unwrap_or_default();

        let registry_endpoints = registry.endpoints.unwrap_or_else(|| {
            DEFAULT_REGISTRY_ENDPOINTS
                .iter()
                .map(|e| e.to_string())
                .collect()
        });
        if registry_endpoints.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one registry endpoint is required".to_string(),
            ));
        }

        let identity = match host.identity.as_deref().unwrap_or("ec2") {
            "ec2" => IdentitySource::Ec2,
            "static" => IdentitySource::Static,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown host identity source {other:?} (expected \"ec2\" or \"static\")"
                )));
            }
        };

        let fallback_host_id = host
            .fallback_id
            .or_else(|| env("DOCKER_HOST"))
            .or_else(|| env("HOSTNAME"))
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| "localhost".to_string());

        let margin = duration_or("leases.safety_margin", leases.safety_margin, SAFETY_MARGIN)?;
        let machine_lease = LeasePolicy::new(
            duration_or("leases.machine_ttl", leases.machine_ttl, MACHINE_TTL)?,
            margin,
        )?;
        let container_lease = LeasePolicy::new(
            duration_or("leases.container_ttl", leases.container_ttl, CONTAINER_TTL)?,
            margin,
        )?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            initial_backoff: duration_or(
                "retry.initial_backoff",
                retry.initial_backoff,
                defaults.initial_backoff,
            )?,
            max_backoff: duration_or("retry.max_backoff", retry.max_backoff, defaults.max_backoff)?,
            max_attempts: retry.max_attempts.unwrap_or(defaults.max_attempts),
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if retry.max_backoff < retry.initial_backoff {
            return Err(ConfigError::Invalid(
                "retry.max_backoff must not be shorter than retry.initial_backoff".to_string(),
            ));
        }

        Ok(Settings {
            registry_endpoints,
            registry_root: registry
                .root
                .unwrap_or_else(|| DEFAULT_REGISTRY_ROOT.to_string()),
            registry_timeout: duration_or(
                "registry.request_timeout",
                registry.request_timeout,
                Duration::from_secs(5),
            )?,
            docker_socket: runtime
                .socket
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKER_SOCKET)),
            runtime_timeout: duration_or(
                "runtime.request_timeout",
                runtime.request_timeout,
                Duration::from_secs(10),
            )?,
            identity,
            fallback_host_id,
            metadata_endpoint: host
                .metadata_endpoint
                .unwrap_or_else(|| DEFAULT_METADATA_ENDPOINT.to_string()),
            metadata_timeout: duration_or(
                "host.request_timeout",
                host.request_timeout,
                Duration::from_secs(2),
            )?,
            machine_lease,
            container_lease,
            retry,
        })
    }
}

fn duration_or(
    field: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => parse_duration(&value).ok_or(ConfigError::Duration { field, value }),
    }
}

/// Parse a duration string like "5s", "500ms", "10m".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
