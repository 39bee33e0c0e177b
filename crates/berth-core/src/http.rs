//! Minimal HTTP/1.1 client plumbing shared by the registry, runtime and
//! identity collaborators.
//!
//! Each request opens a fresh connection (TCP or Unix socket), performs the
//! hyper handshake and drives the connection on a background task. Connect
//! and response-header waits are bounded by the caller's timeout; reading the
//! body is left to the caller so streaming endpoints stay open.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

pub const USER_AGENT: &str = concat!("berth/", env!("CARGO_PKG_VERSION"));

/// Transport-level HTTP failures.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("connect to {target} failed: {reason}")]
    Connect { target: String, reason: String },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("reading response body failed: {0}")]
    Body(String),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

impl HttpError {
    /// Whether the failure happened before the server could see the request.
    ///
    /// Callers with several equivalent endpoints fail over on these.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Handshake(_) | Self::Timeout("connect", _)
        )
    }
}

/// A parsed `http://host:port[/base]` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    authority: String,
    base_path: String,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, HttpError> {
        let uri: Uri = raw
            .parse()
            .map_err(|_| HttpError::InvalidEndpoint(raw.to_string()))?;
        match uri.scheme_str() {
            Some("http") | None => {}
            Some(_) => return Err(HttpError::InvalidEndpoint(raw.to_string())),
        }
        let authority = uri
            .authority()
            .ok_or_else(|| HttpError::InvalidEndpoint(raw.to_string()))?;
        let authority = if authority.port().is_some() {
            authority.to_string()
        } else {
            format!("{}:80", authority.host())
        };
        Ok(Self {
            authority,
            base_path: uri.path().trim_end_matches('/').to_string(),
        })
    }

    /// `host:port` to connect to.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Absolute path for a request against this endpoint.
    pub fn path(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.base_path)
    }
}

/// Open a TCP connection with a connect timeout.
pub async fn connect_tcp(authority: &str, timeout: Duration) -> Result<TcpStream, HttpError> {
    match tokio::time::timeout(timeout, TcpStream::connect(authority)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(HttpError::Connect {
            target: authority.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(HttpError::Timeout("connect", timeout)),
    }
}

/// Open a Unix socket connection with a connect timeout.
pub async fn connect_unix(path: &Path, timeout: Duration) -> Result<UnixStream, HttpError> {
    match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(HttpError::Connect {
            target: path.display().to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(HttpError::Timeout("connect", timeout)),
    }
}

/// Send one request over `io` and wait (bounded) for the response head.
pub async fn send<IO>(
    io: IO,
    req: Request<Full<Bytes>>,
    timeout: Duration,
) -> Result<Response<Incoming>, HttpError>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let exchange = async move {
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
            .await
            .map_err(|e| HttpError::Handshake(e.to_string()))?;

        // Drive the connection in the background; it ends with the body.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "http connection closed with error");
            }
        });

        sender
            .send_request(req)
            .await
            .map_err(|e| HttpError::Request(e.to_string()))
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| HttpError::Timeout("request", timeout))?
}

/// Read a whole response body (bounded) and return it with the status.
pub async fn read_body(
    resp: Response<Incoming>,
    timeout: Duration,
) -> Result<(StatusCode, Bytes), HttpError> {
    let status = resp.status();
    let body = tokio::time::timeout(timeout, resp.into_body().collect())
        .await
        .map_err(|_| HttpError::Timeout("body", timeout))?
        .map_err(|e| HttpError::Body(e.to_string()))?
        .to_bytes();
    Ok((status, body))
}

/// Build a request with the common headers set.
pub fn request(
    method: http::Method,
    host: &str,
    path: &str,
    body: Option<(&str, Bytes)>,
) -> Result<Request<Full<Bytes>>, HttpError> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(http::header::HOST, host)
        .header(http::header::USER_AGENT, USER_AGENT);
    let body = match body {
        Some((content_type, bytes)) => {
            builder = builder.header(http::header::CONTENT_TYPE, content_type);
            bytes
        }
        None => Bytes::new(),
    };
    builder
        .body(Full::new(body))
        .map_err(|e| HttpError::Request(e.to_string()))
}
