//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use bare_tunnel::config::ProxyConfig;
use bare_tunnel::http::HttpServer;
use bare_tunnel::lifecycle::Shutdown;
use bare_tunnel::net::Listener;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A bare server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

/// Start a server after letting the caller adjust the default config.
pub async fn start_server_with(configure: impl FnOnce(&mut ProxyConfig)) -> TestServer {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.drain_timeout_secs = 2;
    configure(&mut config);

    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    TestServer {
        addr,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Read from `stream` until the end of an HTTP head. Returns whatever was
/// read if the peer closes first.
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Stub remote answering every connection with a fixed raw response.
/// Each received request head is sent on the returned channel.
pub async fn start_http_stub(response: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (heads_tx, heads_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let heads_tx = heads_tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let mut body = vec![0u8; content_length(&head)];
                let _ = socket.read_exact(&mut body).await;
                let _ = heads_tx.send(head);
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, heads_rx)
}

/// Stub remote that answers with a raw handshake head and then echoes
/// every byte it receives.
pub async fn start_upgrade_stub(handshake: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (heads_tx, heads_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let heads_tx = heads_tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let _ = heads_tx.send(head);
                if socket.write_all(handshake.as_bytes()).await.is_err() {
                    return;
                }
                let (mut read, mut write) = socket.split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
            });
        }
    });

    (addr, heads_rx)
}

/// What a [`start_silent_stub`] remote has seen on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubEvent {
    /// A full request head arrived.
    Request,
    /// The peer closed its side.
    Closed,
}

/// Stub remote that reads requests and never answers. Reports each request
/// head and each connection the peer closes.
pub async fn start_silent_stub() -> (SocketAddr, mpsc::UnboundedReceiver<StubEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let events_tx = events_tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                if head.ends_with("\r\n\r\n") {
                    let _ = events_tx.send(StubEvent::Request);
                }
                let mut rest = Vec::new();
                let _ = socket.read_to_end(&mut rest).await;
                let _ = events_tx.send(StubEvent::Closed);
            });
        }
    });

    (addr, events_rx)
}

/// Wait for the next stub event, failing the test after five seconds.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<StubEvent>) -> StubEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event from remote stub")
        .expect("remote stub stopped")
}

/// WebSocket echo remote speaking real frames.
pub async fn start_ws_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_close() {
                        break;
                    }
                    if (message.is_text() || message.is_binary()) && ws.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Percent-encode everything outside the unreserved set.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// `Sec-WebSocket-Protocol` value carrying `payload`.
pub fn bare_protocol(payload: &serde_json::Value) -> String {
    format!("bare, {}", percent_encode(&payload.to_string()))
}

/// Send a raw upgrade request to the server and return the connection with
/// the response head (empty if the server closed without answering).
pub async fn raw_upgrade(server: SocketAddr, path: &str, protocol: &str) -> (TcpStream, String) {
    let mut stream = send_raw_upgrade(server, path, protocol).await;
    let head = tokio::time::timeout(Duration::from_secs(5), read_head(&mut stream))
        .await
        .unwrap();
    (stream, head)
}

/// Write a raw upgrade request without waiting for any answer.
pub async fn send_raw_upgrade(server: SocketAddr, path: &str, protocol: &str) -> TcpStream {
    let mut stream = TcpStream::connect(server).await.unwrap();
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {server}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Protocol: {protocol}\r\n\
         \r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    stream
}
