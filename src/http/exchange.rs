//! One request/response exchange over a dedicated connection.
//!
//! # Data Flow
//! ```text
//!              ┌── write task: head + body, flush ──► oneshot(write half)
//! Connection ──┤
//!              └── read task: response head ────────► oneshot(head, reader)
//!
//! write outcome first ─► read outcome ─► framing ─► [gzip] ─► ResponseBody
//! ```
//!
//! # Design Decisions
//! - Both tasks start together so a server that answers before consuming the
//!   whole request body is still read
//! - A failed write aborts the read task; dropping its half closes the socket
//! - Dropping the exchange future aborts both tasks, which closes the socket
//! - Every failure path drops all connection parts before returning

use std::io;
use std::pin::Pin;

use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderMap, HeaderValue, Request, Response};
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::http::body::{BodyReader, Framing};
use crate::http::codec::{self, ResponseHead};
use crate::http::decode;
use crate::http::request::Target;
use crate::http::response::ResponseBody;
use crate::net::connection::Connection;
use crate::observability::metrics;

/// Run one exchange over `conn` and bind the response body to it.
///
/// The connection is closed when the returned body is closed or dropped, or
/// before this returns on any error.
pub async fn exchange(
    conn: Connection,
    target: &Target,
    request: Request<Bytes>,
) -> Result<Response<ResponseBody>, TransportError> {
    let started = Instant::now();
    let result = run(conn, target, request).await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) if err.is_timeout() => "timeout",
        Err(_) => "error",
    };
    metrics::record_exchange(outcome, started.elapsed());
    result
}

async fn run(
    conn: Connection,
    target: &Target,
    request: Request<Bytes>,
) -> Result<Response<ResponseBody>, TransportError> {
    let (mut parts, body) = request.into_parts();
    parts
        .headers
        .insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    let head = codec::encode_request_head(&parts, target, body.len());
    let method = parts.method;

    let (io, guard) = conn.into_parts();
    let id = guard.id();
    let (read_half, write_half) = tokio::io::split(io);

    let (write_tx, write_rx) = oneshot::channel();
    let writing = tokio::spawn(async move {
        let mut writer = BufWriter::new(write_half);
        let written = async {
            writer.write_all(&head).await?;
            writer.write_all(&body).await?;
            writer.flush().await
        }
        .await;
        let _ = write_tx.send(written.map(|()| writer.into_inner()));
    });

    let (read_tx, read_rx) = oneshot::channel();
    let reading = tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let parsed = codec::read_response_head(&mut reader).await;
        let _ = read_tx.send(parsed.map(|head| (head, reader)));
    });
    let tasks = AbortOnDrop(vec![writing.abort_handle(), reading.abort_handle()]);

    let writer = match write_rx.await {
        Ok(Ok(writer)) => writer,
        Ok(Err(err)) => {
            tracing::debug!(connection_id = %id, error = %err, "Request write failed");
            return Err(TransportError::Write(err));
        }
        Err(_) => return Err(TransportError::Write(task_lost("write"))),
    };
    tracing::trace!(connection_id = %id, "Request written");

    let (head, reader) = match read_rx.await {
        Ok(Ok(parsed)) => parsed,
        Ok(Err(err)) => {
            tracing::debug!(connection_id = %id, error = %err, "Response read failed");
            return Err(err);
        }
        Err(_) => return Err(TransportError::Read(task_lost("read"))),
    };

    let ResponseHead {
        status,
        version,
        mut headers,
    } = head;
    let framing = Framing::for_response(&method, status, &headers)?;
    let raw = BodyReader::new(reader, framing);

    let gzipped = is_gzip(&headers) && !framing.is_empty();
    let (body, content_length): (Pin<Box<dyn AsyncRead + Send>>, Option<u64>) = if gzipped {
        headers.remove(CONTENT_ENCODING);
        headers.remove(CONTENT_LENGTH);
        let decoder = decode::gzip(raw).await.map_err(|err| {
            tracing::debug!(connection_id = %id, error = %err, "Invalid gzip body");
            TransportError::decode(err)
        })?;
        (Box::pin(decoder) as Pin<Box<dyn AsyncRead + Send>>, None)
    } else {
        (Box::pin(raw) as Pin<Box<dyn AsyncRead + Send>>, framing.content_length())
    };

    tracing::debug!(connection_id = %id, status = status.as_u16(), ?framing, "Response received");

    tasks.disarm();
    let mut response = Response::new(ResponseBody::new(body, writer, guard, content_length));
    *response.status_mut() = status;
    *response.version_mut() = version;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Aborts the exchange tasks unless disarmed, so an abandoned exchange
/// releases both halves of its connection.
struct AbortOnDrop(Vec<AbortHandle>);

impl AbortOnDrop {
    fn disarm(mut self) {
        self.0.clear();
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("gzip"))
}

fn task_lost(half: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("{half} task ended without reporting"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::{BoxIo, ConnectionTracker};
    use crate::resilience::timeouts::InactivityTimeout;
    use crate::resilience::ReadTimeout;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWrite, DuplexStream, ReadBuf};

    fn target() -> Target {
        Target::from_parts("http", "example.com", None).unwrap()
    }

    fn get() -> Request<Bytes> {
        Request::get("http://example.com/path")
            .header(ACCEPT_ENCODING, "br")
            .body(Bytes::new())
            .unwrap()
    }

    fn connection(tracker: &ConnectionTracker) -> (Connection, DuplexStream) {
        let (client, server) = tokio::io::duplex(16 * 1024);
        (Connection::new(Box::new(client), tracker.track()), server)
    }

    /// Read the request head off the server side.
    async fn read_request(server: &mut DuplexStream) -> String {
        let mut seen = Vec::new();
        let mut byte = [0u8; 1];
        while !seen.ends_with(b"\r\n\r\n") {
            server.read_exact(&mut byte).await.unwrap();
            seen.push(byte[0]);
        }
        String::from_utf8(seen).unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn plain_response() {
        let tracker = ConnectionTracker::new();
        let (conn, mut server) = connection(&tracker);

        let peer = tokio::spawn(async move {
            let head = read_request(&mut server).await;
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-Test: yes\r\n\r\nhello")
                .await
                .unwrap();
            (head, server)
        });

        let mut response = exchange(conn, &target(), get()).await.unwrap();
        let (head, _server) = peer.await.unwrap();

        assert!(head.starts_with("GET /path HTTP/1.1\r\n"));
        assert!(head.contains("accept-encoding: gzip\r\n"));
        assert!(!head.contains("accept-encoding: br"));
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-test"], "yes");
        assert_eq!(response.body().content_length(), Some(5));

        let body = response.body_mut().bytes().await.unwrap();
        assert_eq!(&body[..], b"hello");
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn gzip_body_is_decoded_and_headers_stripped() {
        let tracker = ConnectionTracker::new();
        let (conn, mut server) = connection(&tracker);
        let payload = b"compressible ".repeat(64);
        let compressed = gzip(&payload);

        tokio::spawn(async move {
            read_request(&mut server).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
                compressed.len()
            );
            server.write_all(head.as_bytes()).await.unwrap();
            server.write_all(&compressed).await.unwrap();
            server
        });

        let mut response = exchange(conn, &target(), get()).await.unwrap();
        assert!(response.headers().get(CONTENT_ENCODING).is_none());
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
        assert_eq!(response.body().content_length(), None);

        let body = response.body_mut().bytes().await.unwrap();
        assert_eq!(&body[..], &payload[..]);
    }

    #[tokio::test]
    async fn invalid_gzip_fails_and_closes() {
        let tracker = ConnectionTracker::new();
        let (conn, mut server) = connection(&tracker);

        tokio::spawn(async move {
            read_request(&mut server).await;
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: 12\r\n\r\nnot gzip at!")
                .await
                .unwrap();
            server
        });

        let err = exchange(conn, &target(), get()).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn head_response_skips_gzip() {
        let tracker = ConnectionTracker::new();
        let (conn, mut server) = connection(&tracker);

        tokio::spawn(async move {
            read_request(&mut server).await;
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: 40\r\n\r\n")
                .await
                .unwrap();
            server
        });

        let request = Request::head("http://example.com/").body(Bytes::new()).unwrap();
        let mut response = exchange(conn, &target(), request).await.unwrap();
        assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");
        assert!(response.body_mut().bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_body_is_sent() {
        let tracker = ConnectionTracker::new();
        let (conn, mut server) = connection(&tracker);

        let peer = tokio::spawn(async move {
            let head = read_request(&mut server).await;
            let mut body = [0u8; 7];
            server.read_exact(&mut body).await.unwrap();
            server
                .write_all(b"HTTP/1.1 204 No Content\r\n\r\n")
                .await
                .unwrap();
            (head, body, server)
        });

        let request = Request::post("http://example.com/submit")
            .body(Bytes::from_static(b"payload"))
            .unwrap();
        let response = exchange(conn, &target(), request).await.unwrap();
        let (head, body, _server) = peer.await.unwrap();

        assert_eq!(response.status(), 204);
        assert!(head.contains("content-length: 7\r\n"));
        assert_eq!(&body, b"payload");
    }

    #[tokio::test]
    async fn peer_closing_early_is_a_read_error() {
        let tracker = ConnectionTracker::new();
        let (conn, mut server) = connection(&tracker);

        tokio::spawn(async move {
            read_request(&mut server).await;
            drop(server);
        });

        let err = exchange(conn, &target(), get()).await.unwrap_err();
        assert!(matches!(err, TransportError::Read(_)));
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_peer_times_out() {
        let tracker = ConnectionTracker::new();
        let (client, mut server) = tokio::io::duplex(16 * 1024);
        let io: BoxIo = Box::new(InactivityTimeout::new(client, Duration::from_secs(2)));
        let conn = Connection::new(io, tracker.track());

        tokio::spawn(async move {
            read_request(&mut server).await;
            server.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();
            // Never finishes the head.
            std::future::pending::<()>().await;
        });

        let err = exchange(conn, &target(), get()).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            err,
            TransportError::Timeout(ReadTimeout::Inactivity(d)) if d == Duration::from_secs(2)
        ));
        assert_eq!(tracker.active_count(), 0);
    }

    /// Stream whose writes always fail and whose reads never complete.
    struct BrokenPipe;

    impl AsyncRead for BrokenPipe {
        fn poll_read(self: Pin<&mut Self>, _: &mut Context<'_>, _: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for BrokenPipe {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_failure_aborts_the_exchange() {
        let tracker = ConnectionTracker::new();
        let conn = Connection::new(Box::new(BrokenPipe), tracker.track());

        let err = exchange(conn, &target(), get()).await.unwrap_err();
        assert!(matches!(err, TransportError::Write(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn body_close_is_exactly_once() {
        let tracker = ConnectionTracker::new();
        let (conn, mut server) = connection(&tracker);

        tokio::spawn(async move {
            read_request(&mut server).await;
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc")
                .await
                .unwrap();
            server
        });

        let mut response = exchange(conn, &target(), get()).await.unwrap();
        assert_eq!(tracker.active_count(), 1);

        response.body_mut().close().await.unwrap();
        assert_eq!(tracker.active_count(), 0);
        response.body_mut().close().await.unwrap();
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn abandoned_exchange_closes_the_connection() {
        let tracker = ConnectionTracker::new();
        let (conn, mut server) = connection(&tracker);
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(async move {
            read_request(&mut server).await;
            // Never answers; waits for the client side to go away.
            let mut rest = Vec::new();
            let _ = server.read_to_end(&mut rest).await;
            let _ = closed_tx.send(());
        });

        let abandoned = tokio::time::timeout(Duration::from_millis(100), exchange(conn, &target(), get())).await;
        assert!(abandoned.is_err());
        assert_eq!(tracker.active_count(), 0);

        tokio::time::timeout(Duration::from_secs(2), closed_rx)
            .await
            .expect("connection still open after the exchange was dropped")
            .unwrap();
    }
}
