//! EC2 instance metadata lookup.
//!
//! Fetches a fixed set of metadata paths, one request each, and stores them
//! camelCased in the metadata blob (`public-hostname` → `publicHostname`).
//! The host identifier is the public hostname.

use std::time::Duration;

use http::{Method, StatusCode};
use serde_json::{Map, Value};
use tracing::debug;

use berth_core::HostRecord;
use berth_core::http::{self as transport, Endpoint};

use crate::provider::{HostIdentityProvider, IdentityError, IdentityFuture, IdentityResult};

/// Metadata paths queried, relative to the `meta-data` root.
pub const METADATA_FIELDS: &[&str] = &[
    "ami-id",
    "hostname",
    "instance-id",
    "instance-type",
    "local-hostname",
    "local-ipv4",
    "public-hostname",
    "public-ipv4",
    "placement/availability-zone",
];

const HOST_ID_FIELD: &str = "publicHostname";

#[derive(Debug, Clone)]
pub struct Ec2MetadataProvider {
    endpoint: Endpoint,
    timeout: Duration,
}

impl Ec2MetadataProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> IdentityResult<Self> {
        Ok(Self {
            endpoint: Endpoint::parse(endpoint)?,
            timeout,
        })
    }

    /// Fetch one field; `None` when the service does not have it.
    async fn fetch(&self, field: &str) -> IdentityResult<Option<String>> {
        let path = self.endpoint.path(&format!("/{field}"));
        let stream = transport::connect_tcp(self.endpoint.authority(), self.timeout).await?;
        let req = transport::request(Method::GET, self.endpoint.authority(), &path, None)?;
        let resp = transport::send(stream, req, self.timeout).await?;
        let (status, body) = transport::read_body(resp, self.timeout).await?;

        match status {
            s if s.is_success() => Ok(Some(String::from_utf8_lossy(&body).trim().to_string())),
            StatusCode::NOT_FOUND => Ok(None),
            s => Err(IdentityError::Status {
                status: s.as_u16(),
                path,
            }),
        }
    }

    async fn lookup(&self) -> IdentityResult<HostRecord> {
        let mut metadata = Map::new();
        for field in METADATA_FIELDS {
            if let Some(value) = self.fetch(field).await? {
                metadata.insert(camel_case_key(field), Value::String(value));
            }
        }
        debug!(fields = metadata.len(), "instance metadata fetched");
        record_from_metadata(metadata)
    }
}

impl HostIdentityProvider for Ec2MetadataProvider {
    fn resolve(&self) -> IdentityFuture<'_, HostRecord> {
        Box::pin(self.lookup())
    }
}

fn record_from_metadata(metadata: Map<String, Value>) -> IdentityResult<HostRecord> {
    let host_id = metadata
        .get(HOST_ID_FIELD)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(IdentityError::MissingHostId(HOST_ID_FIELD))?
        .to_string();
    Ok(HostRecord::new(host_id, Value::Object(metadata)))
}

/// `placement/availability-zone` → `availabilityZone`.
fn camel_case_key(path: &str) -> String {
    let leaf = path.rsplit('/').next().unwrap_or(path);
    let mut out = String::with_capacity(leaf.len());
    let mut upper = false;
    for c in leaf.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_cases_metadata_paths() {
        assert_eq!(camel_case_key("public-hostname"), "publicHostname");
        assert_eq!(camel_case_key("ami-id"), "amiId");
        assert_eq!(camel_case_key("local-ipv4"), "localIpv4");
        assert_eq!(camel_case_key("placement/availability-zone"), "availabilityZone");
        assert_eq!(camel_case_key("hostname"), "hostname");
    }

    #[test]
    fn record_uses_public_hostname() {
        let mut metadata = Map::new();
        metadata.insert(
            "publicHostname".to_string(),
            Value::String("ec2-54-1-2-3.compute-1.amazonaws.com".to_string()),
        );
        metadata.insert("instanceId".to_string(), Value::String("i-0abc".to_string()));

        let record = record_from_metadata(metadata).unwrap();
        assert_eq!(record.host_id, "ec2-54-1-2-3.compute-1.amazonaws.com");
        assert_eq!(record.metadata["instanceId"], "i-0abc");
    }

    #[test]
    fn missing_public_hostname_is_an_error() {
        let mut metadata = Map::new();
        metadata.insert("instanceId".to_string(), Value::String("i-0abc".to_string()));
        assert!(matches!(
            record_from_metadata(metadata),
            Err(IdentityError::MissingHostId(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_metadata_service_errors() {
        let provider =
            Ec2MetadataProvider::new("http://127.0.0.1:1/latest/meta-data", Duration::from_millis(300))
                .unwrap();
        assert!(matches!(
            provider.resolve().await,
            Err(IdentityError::Http(_))
        ));
    }
}
