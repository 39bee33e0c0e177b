//! Docker Engine API client over the local Unix socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use serde::Deserialize;
use tracing::{debug, info};

use berth_core::http as transport;
use berth_core::{ContainerId, LifecycleEvent};

use crate::error::{RuntimeError, RuntimeResult};
use crate::events::EventDecoder;
use crate::observer::{EventStream, RuntimeFuture, RuntimeObserver};

/// Host header sent to the engine; the socket ignores it but HTTP/1.1 needs one.
const DOCKER_HOST_HEADER: &str = "docker";

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
}

/// Talks to the Docker daemon on `socket`. Each call opens its own connection,
/// so one client can be shared by every loop.
#[derive(Debug, Clone)]
pub struct DockerClient {
    socket: PathBuf,
    timeout: Duration,
}

impl DockerClient {
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    async fn open(&self, path: &str) -> RuntimeResult<http::Response<Incoming>> {
        let stream = transport::connect_unix(&self.socket, self.timeout).await?;
        let req = transport::request(Method::GET, DOCKER_HOST_HEADER, path, None)?;
        Ok(transport::send(stream, req, self.timeout).await?)
    }

    async fn get(&self, path: &str) -> RuntimeResult<(StatusCode, Bytes)> {
        let resp = self.open(path).await?;
        Ok(transport::read_body(resp, self.timeout).await?)
    }

    async fn list_running_ids(&self) -> RuntimeResult<Vec<ContainerId>> {
        let path = "/containers/json";
        let (status, body) = self.get(path).await?;
        if !status.is_success() {
            return Err(status_error(status, path, &body));
        }
        let containers: Vec<ContainerSummary> =
            serde_json::from_slice(&body).map_err(|e| RuntimeError::Decode(e.to_string()))?;
        debug!(count = containers.len(), "listed running containers");
        Ok(containers
            .into_iter()
            .map(|c| ContainerId::new(c.id))
            .collect())
    }

    async fn inspect(&self, id: &ContainerId) -> RuntimeResult<Option<Bytes>> {
        let path = format!("/containers/{}/json", urlencoding::encode(id.as_str()));
        let (status, body) = self.get(&path).await?;
        match status {
            s if s.is_success() => Ok(Some(body)),
            StatusCode::NOT_FOUND => {
                debug!(container_id = %id, "container not found");
                Ok(None)
            }
            s => Err(status_error(s, &path, &body)),
        }
    }

    async fn open_events(&self) -> RuntimeResult<Box<dyn EventStream>> {
        let path = "/events";
        let resp = self.open(path).await?;
        let status = resp.status();
        if !status.is_success() {
            let (_, body) = transport::read_body(resp, self.timeout).await?;
            return Err(status_error(status, path, &body));
        }
        info!(socket = %self.socket.display(), "event stream opened");
        Ok(Box::new(DockerEventStream {
            body: resp.into_body(),
            decoder: EventDecoder::new(),
        }))
    }
}

impl RuntimeObserver for DockerClient {
    fn list_running(&self) -> RuntimeFuture<'_, Vec<ContainerId>> {
        Box::pin(self.list_running_ids())
    }

    fn fetch_descriptor<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, Option<Bytes>> {
        Box::pin(self.inspect(id))
    }

    fn stream_events(&self) -> RuntimeFuture<'_, Box<dyn EventStream>> {
        Box::pin(self.open_events())
    }
}

/// Events decoded from a streaming `/events` response body.
struct DockerEventStream {
    body: Incoming,
    decoder: EventDecoder,
}

impl DockerEventStream {
    async fn read_next(&mut self) -> RuntimeResult<Option<LifecycleEvent>> {
        loop {
            if let Some(event) = self.decoder.next_event()? {
                return Ok(Some(event));
            }
            match self.body.frame().await {
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        self.decoder.push(data);
                    }
                }
                Some(Err(e)) => return Err(RuntimeError::Stream(e.to_string())),
                None => {
                    self.decoder.finish()?;
                    return Ok(None);
                }
            }
        }
    }
}

impl EventStream for DockerEventStream {
    fn next_event(&mut self) -> RuntimeFuture<'_, Option<LifecycleEvent>> {
        Box::pin(self.read_next())
    }
}

fn status_error(status: StatusCode, path: &str, body: &[u8]) -> RuntimeError {
    #[derive(Deserialize)]
    struct EngineError {
        message: String,
    }

    let message = serde_json::from_slice::<EngineError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
    RuntimeError::Status {
        status: status.as_u16(),
        path: path.to_string(),
        message,
    }
}
