//! Test helpers for session driver scenarios

#![allow(dead_code)]

use async_trait::async_trait;
use openweather::config::{QueryConfig, ServerConfig};
use openweather::{Network, RequestTemplate};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::io::{Builder, Mock};

pub const BODY: &[u8] = br#"{"coord":{"lon":100.5,"lat":13.75},"weather":[{"id":800,"main":"Clear"}],"main":{"temp":301.15,"feels_like":305.2,"pressure":1009,"humidity":74},"name":"Bangkok"}"#;

/// A complete 200 response carrying [`BODY`].
pub fn ok_response() -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        BODY.len()
    )
    .into_bytes();
    response.extend_from_slice(BODY);
    response
}

/// Wrap `body` in a minimal 200 response.
pub fn response_with_body(body: &[u8]) -> Vec<u8> {
    let mut response = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
    response.extend_from_slice(body);
    response
}

pub fn server(host: &str, port: u16) -> ServerConfig {
    ServerConfig {
        host: host.to_string(),
        port,
        path: "/data/2.5/weather".to_string(),
    }
}

pub fn query() -> QueryConfig {
    QueryConfig {
        lat: "13.75".to_string(),
        lon: "100.50".to_string(),
        api_key: "test-key".to_string(),
    }
}

pub fn request() -> RequestTemplate {
    RequestTemplate::new(&server("weather.test", 80), &query())
}

/// What a scripted connection does after accepting the request.
pub enum Script {
    /// Deliver these chunks, one per read, then close.
    Chunks(Vec<Vec<u8>>),
    /// Fail the request write.
    SendError,
}

/// Network double with scripted connections and call counters.
#[derive(Default)]
pub struct ScriptedNetwork {
    pub resolves: AtomicUsize,
    pub connects: AtomicUsize,
    resolve_fails: bool,
    scripts: Mutex<VecDeque<Script>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_resolve() -> Self {
        Self {
            resolve_fails: true,
            ..Self::default()
        }
    }

    /// Queue a connection delivering `chunks`.
    pub fn with_chunks(self, chunks: Vec<Vec<u8>>) -> Self {
        self.push(Script::Chunks(chunks));
        self
    }

    pub fn with_script(self, script: Script) -> Self {
        self.push(script);
        self
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    type Stream = Mock;

    async fn resolve(&self, _host: &str, port: u16) -> io::Result<SocketAddr> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.resolve_fails {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such host"));
        }
        Ok(SocketAddr::from(([192, 0, 2, 10], port)))
    }

    /// Connections beyond the queued scripts are refused.
    async fn connect(&self, _addr: SocketAddr) -> io::Result<Mock> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();
        let mut builder = Builder::new();
        match script {
            Some(Script::Chunks(chunks)) => {
                builder.write(request().as_bytes());
                for chunk in &chunks {
                    builder.read(chunk);
                }
            }
            Some(Script::SendError) => {
                builder.write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer reset"));
            }
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))
            }
        }
        Ok(builder.build())
    }
}

/// Split `bytes` into pieces at the given offsets.
pub fn split_at(bytes: &[u8], offsets: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for &offset in offsets {
        chunks.push(bytes[start..offset].to_vec());
        start = offset;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

/// One-shot loopback HTTP server.
///
/// Accepts a single connection, reads the request head, writes `chunks`
/// with a short pause between them, then holds the socket open for
/// `linger` before closing. Returns the listening address and a handle
/// resolving to the raw request received.
pub async fn spawn_http_server(
    chunks: Vec<Vec<u8>>,
    linger: Duration,
) -> (SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 256];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        for chunk in chunks {
            socket.write_all(&chunk).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(linger).await;
        request
    });

    (addr, handle)
}
