//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::http::StatusCode;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the mock backend sends for one request.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            delay: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Handle to a running mock backend.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicU32>,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests received so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Request bodies received so far, in arrival order.
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

/// Start a programmable backend on an ephemeral port.
///
/// `respond` receives the zero-based call index.
pub async fn start_backend<F>(respond: F) -> MockBackend
where
    F: Fn(u32) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let backend = MockBackend {
        addr,
        calls: Arc::new(AtomicU32::new(0)),
        bodies: Arc::new(Mutex::new(Vec::new())),
    };
    let respond = Arc::new(respond);

    let handle = backend.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let respond = respond.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                serve_one(socket, handle, respond).await;
            });
        }
    });

    backend
}

/// Backend that replays `responses` in order, repeating the last one.
pub async fn start_sequence(responses: Vec<MockResponse>) -> MockBackend {
    assert!(!responses.is_empty());
    start_backend(move |n| {
        let idx = (n as usize).min(responses.len() - 1);
        responses[idx].clone()
    })
    .await
}

/// Backend that always answers with `status`.
pub async fn start_fixed(status: u16) -> MockBackend {
    start_backend(move |_| MockResponse::status(status)).await
}

/// A URL on a port with nothing listening.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

async fn serve_one<F>(mut socket: TcpStream, backend: MockBackend, respond: Arc<F>)
where
    F: Fn(u32) -> MockResponse + Send + Sync + 'static,
{
    let Some(body) = read_request(&mut socket).await else {
        return;
    };
    let n = backend.calls.fetch_add(1, Ordering::SeqCst);
    backend.bodies.lock().unwrap().push(body);

    let response = respond(n);
    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let reason = StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let mut raw = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason,
        response.body.len()
    );
    for (name, value) in &response.headers {
        raw.push_str(&format!("{}: {}\r\n", name, value));
    }
    raw.push_str("\r\n");
    raw.push_str(&response.body);

    let _ = socket.write_all(raw.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Read one request, returning its body.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let end = buf.len().min(header_end + content_length);
    Some(String::from_utf8_lossy(&buf[header_end..end]).to_string())
}
