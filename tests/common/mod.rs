//! Shared utilities for integration testing.
//!
//! Every backend binds an ephemeral loopback port, serves each accepted
//! connection from its own task, and expects the client to send one request.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Read one request head off `socket`.
pub async fn read_head(socket: &mut TcpStream) -> Option<String> {
    let mut seen = Vec::new();
    let mut byte = [0u8; 1];
    while !seen.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(1) => seen.push(byte[0]),
            _ => return None,
        }
    }
    String::from_utf8(seen).ok()
}

/// Start a backend whose per-connection behavior is `f`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(f(socket));
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Start a backend that answers every request with `raw` bytes, then closes.
pub async fn start_raw_backend(raw: Vec<u8>) -> SocketAddr {
    let raw = Arc::new(raw);
    start_programmable_backend(move |mut socket| {
        let raw = Arc::clone(&raw);
        async move {
            if read_head(&mut socket).await.is_none() {
                return;
            }
            let _ = socket.write_all(&raw).await;
            let _ = socket.shutdown().await;
        }
    })
    .await
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_raw_backend(
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            response.len(),
            response
        )
        .into_bytes(),
    )
    .await
}

/// Start a backend that writes `prefix`, then goes silent without closing.
pub async fn start_stalling_backend(prefix: &'static [u8]) -> SocketAddr {
    start_programmable_backend(move |mut socket| async move {
        if read_head(&mut socket).await.is_none() {
            return;
        }
        let _ = socket.write_all(prefix).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
    })
    .await
}

/// Start a backend that sends a `len`-byte body one byte every `gap`.
pub async fn start_trickle_backend(len: usize, gap: Duration) -> SocketAddr {
    start_programmable_backend(move |mut socket| async move {
        if read_head(&mut socket).await.is_none() {
            return;
        }
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {len}\r\n\r\n");
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for _ in 0..len {
            tokio::time::sleep(gap).await;
            if socket.write_all(b".").await.is_err() {
                return;
            }
        }
        let _ = socket.shutdown().await;
    })
    .await
}

/// Start a backend that answers `body` and reports on `closed` once the
/// client side of the connection has gone away.
pub async fn start_close_observing_backend(body: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let addr = start_programmable_backend(move |mut socket| {
        let closed_tx = closed_tx.clone();
        async move {
            if read_head(&mut socket).await.is_none() {
                return;
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest).await;
            let _ = closed_tx.send(());
        }
    })
    .await;
    (addr, closed_rx)
}

/// Start a backend that records when each connection was accepted.
pub async fn start_recording_backend() -> (SocketAddr, Arc<Mutex<Vec<Instant>>>) {
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&accepted);
    let addr = start_programmable_backend(move |mut socket| {
        log.lock().unwrap().push(Instant::now());
        async move {
            if read_head(&mut socket).await.is_none() {
                return;
            }
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\nadmitted")
                .await;
            let _ = socket.shutdown().await;
        }
    })
    .await;
    (addr, accepted)
}

/// Address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
