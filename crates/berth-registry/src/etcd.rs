//! etcd v2 keys API client.
//!
//! `PUT /v2/keys/<key>` with a form body `value=<v>&ttl=<secs>` sets a key,
//! `DELETE /v2/keys/<key>?recursive=true` removes a subtree. Endpoints are
//! tried in order: a connect-level failure moves on to the next endpoint, an
//! HTTP-level error from a reachable member is returned as is.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use berth_core::http::{self as transport, Endpoint, HttpError};

use crate::client::{RegistryClient, RegistryFuture};
use crate::error::{RegistryError, RegistryResult};

/// etcd error code for "Key not found".
const ERROR_KEY_NOT_FOUND: u64 = 100;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Client for a set of etcd v2 members.
#[derive(Debug, Clone)]
pub struct EtcdClient {
    endpoints: Vec<Endpoint>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct NodeResponse {
    node: Node,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(rename = "modifiedIndex")]
    modified_index: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "errorCode")]
    error_code: u64,
    message: String,
    #[serde(default)]
    cause: Option<String>,
}

impl EtcdClient {
    /// Create a client for the given member URLs (`http://host:port`).
    pub fn new(endpoints: &[String], timeout: Duration) -> RegistryResult<Self> {
        let endpoints = endpoints
            .iter()
            .map(|e| Endpoint::parse(e))
            .collect::<Result<Vec<_>, _>>()?;
        if endpoints.is_empty() {
            return Err(RegistryError::Unreachable(
                "no registry endpoints configured".to_string(),
            ));
        }
        Ok(Self { endpoints, timeout })
    }

    async fn set_key(&self, key: &str, value: &[u8], ttl: Duration) -> RegistryResult<u64> {
        let body = form_body(value, ttl);
        let (status, bytes) = self
            .execute(Method::PUT, &keys_path(key)?, Some(Bytes::from(body)))
            .await?;

        if !status.is_success() {
            return Err(status_error(status, &bytes));
        }
        let resp: NodeResponse =
            serde_json::from_slice(&bytes).map_err(|e| RegistryError::Decode(e.to_string()))?;
        debug!(%key, ttl = ?ttl, version = resp.node.modified_index, "etcd set");
        Ok(resp.node.modified_index)
    }

    async fn delete_key(&self, key: &str, recursive: bool) -> RegistryResult<()> {
        let mut path = keys_path(key)?;
        if recursive {
            path.push_str("?recursive=true");
        }
        let (status, bytes) = self.execute(Method::DELETE, &path, None).await?;

        if status.is_success() {
            debug!(%key, recursive, "etcd delete");
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND && is_key_not_found(&bytes) {
            debug!(%key, "etcd delete of absent key");
            return Ok(());
        }
        Err(status_error(status, &bytes))
    }

    /// Run one request against the first reachable endpoint.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> RegistryResult<(StatusCode, Bytes)> {
        let mut last_error: Option<HttpError> = None;

        for endpoint in &self.endpoints {
            match self.exchange(endpoint, method.clone(), path, body.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transport() => {
                    warn!(endpoint = %endpoint.authority(), error = %e, "registry endpoint unreachable");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::Unreachable(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    async fn exchange(
        &self,
        endpoint: &Endpoint,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<(StatusCode, Bytes), HttpError> {
        let stream = transport::connect_tcp(endpoint.authority(), self.timeout).await?;
        let req = transport::request(
            method,
            endpoint.authority(),
            &endpoint.path(path),
            body.map(|b| (FORM_CONTENT_TYPE, b)),
        )?;
        let resp = transport::send(stream, req, self.timeout).await?;
        transport::read_body(resp, self.timeout).await
    }
}

impl RegistryClient for EtcdClient {
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
        ttl: Duration,
    ) -> RegistryFuture<'a, u64> {
        Box::pin(self.set_key(key, value, ttl))
    }

    fn delete<'a>(&'a self, key: &'a str, recursive: bool) -> RegistryFuture<'a, ()> {
        Box::pin(self.delete_key(key, recursive))
    }
}

/// `/v2/keys` path for a registry key, each segment percent-encoded.
///
/// Segments are kept one to one; an empty segment (`//`, trailing `/`) is
/// rejected rather than collapsed into a different key.
fn keys_path(key: &str) -> RegistryResult<String> {
    let relative = key.strip_prefix('/').unwrap_or(key);
    let mut encoded = Vec::new();
    for segment in relative.split('/') {
        if segment.is_empty() {
            return Err(RegistryError::InvalidKey(key.to_string()));
        }
        encoded.push(urlencoding::encode(segment).into_owned());
    }
    Ok(format!("/v2/keys/{}", encoded.join("/")))
}

/// TTLs are whole seconds in etcd; never round down to "no expiry".
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

fn form_body(value: &[u8], ttl: Duration) -> String {
    let value = String::from_utf8_lossy(value);
    format!(
        "value={}&ttl={}",
        urlencoding::encode(&value),
        ttl_secs(ttl)
    )
}

fn is_key_not_found(body: &[u8]) -> bool {
    serde_json::from_slice::<ErrorResponse>(body)
        .map(|e| e.error_code == ERROR_KEY_NOT_FOUND)
        .unwrap_or(false)
}

fn status_error(status: StatusCode, body: &[u8]) -> RegistryError {
    let message = match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(err) => match err.cause {
            Some(cause) => format!("{} (code {}, {})", err.message, err.error_code, cause),
            None => format!("{} (code {})", err.message, err.error_code),
        },
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    };
    RegistryError::Status {
        status: status.as_u16(),
        message,
    }
}
