//! Response body bound to its connection.
//!
//! # Responsibilities
//! - Stream the (possibly decompressed) body to the caller
//! - Own the connection until the body is closed or dropped
//! - Close the connection exactly once
//!
//! # Design Decisions
//! - `close()` is idempotent; reads after close fail with `NotConnected`
//! - Dropping an unclosed body closes the connection without a graceful
//!   shutdown of the write side

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf, WriteHalf};

use crate::net::connection::{BoxIo, ConnectionGuard, ConnectionId};

type BodyStream = Pin<Box<dyn AsyncRead + Send>>;

/// Write half and lifecycle guard of the connection behind a body.
struct BoundConnection {
    writer: WriteHalf<BoxIo>,
    guard: ConnectionGuard,
}

/// Body of a response returned by the transport.
///
/// Reading yields the body bytes. The caller must [`close`](Self::close) it
/// (or drop it) to release the connection.
pub struct ResponseBody {
    reader: Option<BodyStream>,
    conn: Option<BoundConnection>,
    content_length: Option<u64>,
    id: ConnectionId,
}

impl ResponseBody {
    pub(crate) fn new(
        reader: BodyStream,
        writer: WriteHalf<BoxIo>,
        guard: ConnectionGuard,
        content_length: Option<u64>,
    ) -> Self {
        let id = guard.id();
        Self {
            reader: Some(reader),
            conn: Some(BoundConnection { writer, guard }),
            content_length,
            id,
        }
    }

    /// Body length when known; `None` for chunked, close-delimited, or
    /// transparently decompressed bodies.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Close the body and its connection.
    ///
    /// The first call releases the read side, shuts down the write side and
    /// frees the connection. Later calls do nothing.
    pub async fn close(&mut self) -> io::Result<()> {
        self.reader.take();
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let result = match conn.writer.shutdown().await {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        };
        drop(conn);
        tracing::trace!(connection_id = %self.id, "Response body closed");
        result
    }

    /// Read the remaining body into memory, then close.
    pub async fn bytes(&mut self) -> io::Result<Bytes> {
        let mut buf = Vec::with_capacity(self.content_length.unwrap_or(0).min(1 << 20) as usize);
        let read = self.read_to_end(&mut buf).await;
        let closed = self.close().await;
        read?;
        closed?;
        Ok(Bytes::from(buf))
    }
}

impl AsyncRead for ResponseBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.reader.as_mut() {
            Some(reader) => reader.as_mut().poll_read(cx, buf),
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "read on closed response body",
            ))),
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("connection_id", &self.id)
            .field("content_length", &self.content_length)
            .field("closed", &self.is_closed())
            .finish()
    }
}
