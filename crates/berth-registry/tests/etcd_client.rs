//! EtcdClient against a canned HTTP server.
//!
//! The server accepts connections, records each request and replies with the
//! next scripted response.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use berth_registry::{EtcdClient, RegistryClient, RegistryError};

#[derive(Debug, Clone)]
struct Recorded {
    request_line: String,
    body: String,
}

struct CannedServer {
    addr: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

async fn canned_server(responses: Vec<(u16, &'static str)>) -> CannedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();
    let mut responses: VecDeque<(u16, &'static str)> = responses.into();

    tokio::spawn(async move {
        while let Some((status, body)) = responses.pop_front() {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            recorded.lock().unwrap().push(request);

            let reason = match status {
                200 => "OK",
                201 => "Created",
                404 => "Not Found",
                _ => "Error",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
    });

    CannedServer { addr, requests }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Recorded {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    }
}

#[tokio::test]
async fn set_sends_form_and_returns_modified_index() {
    let server = canned_server(vec![(
        201,
        r#"{"action":"set","node":{"key":"/docker/machines/h/containers/c1","value":"{}","ttl":60,"modifiedIndex":42,"createdIndex":42}}"#,
    )])
    .await;

    let client =
        EtcdClient::new(&[format!("http://{}", server.addr)], Duration::from_secs(2)).unwrap();
    let version = client
        .set(
            "/docker/machines/h/containers/c1",
            br#"{"Id":"c1"}"#,
            Duration::from_secs(60),
        )
        .await
        .unwrap();
    assert_eq!(version, 42);

    let requests = server.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].request_line,
        "PUT /v2/keys/docker/machines/h/containers/c1 HTTP/1.1"
    );
    assert_eq!(requests[0].body, "value=%7B%22Id%22%3A%22c1%22%7D&ttl=60");
}

#[tokio::test]
async fn delete_of_missing_key_is_success() {
    let server = canned_server(vec![(
        404,
        r#"{"errorCode":100,"message":"Key not found","cause":"/docker/machines/h/containers/gone","index":7}"#,
    )])
    .await;

    let client =
        EtcdClient::new(&[format!("http://{}", server.addr)], Duration::from_secs(2)).unwrap();
    client
        .delete("/docker/machines/h/containers/gone", true)
        .await
        .unwrap();

    let requests = server.requests.lock().unwrap().clone();
    assert_eq!(
        requests[0].request_line,
        "DELETE /v2/keys/docker/machines/h/containers/gone?recursive=true HTTP/1.1"
    );
}

#[tokio::test]
async fn unreachable_endpoint_fails_over_to_next() {
    let server = canned_server(vec![(
        200,
        r#"{"action":"set","node":{"key":"/k","value":"v","modifiedIndex":3,"createdIndex":1}}"#,
    )])
    .await;

    let client = EtcdClient::new(
        &[
            "http://127.0.0.1:1".to_string(),
            format!("http://{}", server.addr),
        ],
        Duration::from_secs(2),
    )
    .unwrap();
    let version = client.set("/k", b"v", Duration::from_secs(5)).await.unwrap();
    assert_eq!(version, 3);
}

#[tokio::test]
async fn http_error_is_not_retried_on_other_endpoints() {
    let first = canned_server(vec![(
        500,
        r#"{"errorCode":300,"message":"Raft Internal Error"}"#,
    )])
    .await;
    let second = canned_server(vec![(200, "{}")]).await;

    let client = EtcdClient::new(
        &[
            format!("http://{}", first.addr),
            format!("http://{}", second.addr),
        ],
        Duration::from_secs(2),
    )
    .unwrap();
    let err = client.set("/k", b"v", Duration::from_secs(5)).await.unwrap_err();
    match err {
        RegistryError::Status { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("Raft Internal Error"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(second.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn all_endpoints_down_is_unreachable() {
    let client = EtcdClient::new(
        &["http://127.0.0.1:1".to_string()],
        Duration::from_millis(500),
    )
    .unwrap();
    let err = client.delete("/k", true).await.unwrap_err();
    assert!(matches!(err, RegistryError::Unreachable(_)));
}
