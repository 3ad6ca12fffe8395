//! Response body framing.
//!
//! Turns the buffered read half of a connection into a reader that yields
//! exactly the message body: fixed length, chunked, or until close.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Method, StatusCode};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

use crate::error::TransportError;

const MAX_CHUNK_LINE: usize = 4096;

/// How the end of the body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body by protocol (HEAD, 1xx, 204, 304).
    Empty,
    Length(u64),
    Chunked,
    /// Read until the peer closes the connection.
    UntilClose,
}

impl Framing {
    pub fn for_response(
        method: &Method,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<Self, TransportError> {
        if method == Method::HEAD
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            return Ok(Self::Empty);
        }

        if headers.contains_key(TRANSFER_ENCODING) {
            let last = headers
                .get_all(TRANSFER_ENCODING)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(','))
                .map(str::trim)
                .filter(|coding| !coding.is_empty())
                .last();
            return Ok(match last {
                Some(coding) if coding.eq_ignore_ascii_case("chunked") => Self::Chunked,
                _ => Self::UntilClose,
            });
        }

        let mut length = None;
        for value in headers.get_all(CONTENT_LENGTH) {
            let parsed = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| TransportError::MalformedResponse("invalid Content-Length".into()))?;
            match length {
                Some(previous) if previous != parsed => {
                    return Err(TransportError::MalformedResponse(
                        "conflicting Content-Length values".into(),
                    ))
                }
                _ => length = Some(parsed),
            }
        }

        Ok(match length {
            Some(0) => Self::Empty,
            Some(n) => Self::Length(n),
            None => Self::UntilClose,
        })
    }

    /// Body size when known up front.
    pub fn content_length(self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Length(n) => Some(n),
            Self::Chunked | Self::UntilClose => None,
        }
    }

    pub fn is_empty(self) -> bool {
        self == Self::Empty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Length(u64),
    ChunkSize,
    ChunkData(u64),
    ChunkEnd,
    Trailer,
    UntilClose,
    Done,
}

/// Reader that yields one framed message body.
pub struct BodyReader<R> {
    inner: R,
    state: State,
    line: Vec<u8>,
}

impl<R> BodyReader<R> {
    pub fn new(inner: R, framing: Framing) -> Self {
        let state = match framing {
            Framing::Empty | Framing::Length(0) => State::Done,
            Framing::Length(n) => State::Length(n),
            Framing::Chunked => State::ChunkSize,
            Framing::UntilClose => State::UntilClose,
        };
        Self {
            inner,
            state,
            line: Vec::new(),
        }
    }
}

impl<R: AsyncBufRead + Unpin> BodyReader<R> {
    /// Accumulate one CRLF-terminated line into `self.line`.
    fn poll_line(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            let available = ready!(Pin::new(&mut self.inner).poll_fill_buf(cx))?;
            if available.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside chunked body",
                )));
            }
            let (taken, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            self.line.extend_from_slice(&available[..taken]);
            Pin::new(&mut self.inner).consume(taken);

            if self.line.len() > MAX_CHUNK_LINE {
                return Poll::Ready(Err(invalid_chunk("chunk line too long")));
            }
            if complete {
                while matches!(self.line.last(), Some(b'\n' | b'\r')) {
                    self.line.pop();
                }
                return Poll::Ready(Ok(()));
            }
        }
    }

    fn parse_chunk_size(&self) -> io::Result<u64> {
        let line = std::str::from_utf8(&self.line).map_err(|_| invalid_chunk("chunk size is not ASCII"))?;
        let size = line.split(';').next().unwrap_or_default().trim();
        u64::from_str_radix(size, 16).map_err(|_| invalid_chunk("invalid chunk size"))
    }

    fn poll_copy(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
        remaining: u64,
    ) -> Poll<io::Result<usize>> {
        let available = ready!(Pin::new(&mut self.inner).poll_fill_buf(cx))?;
        if available.is_empty() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before end of body",
            )));
        }
        let limit = usize::try_from(remaining).unwrap_or(usize::MAX);
        let n = available.len().min(buf.remaining()).min(limit);
        buf.put_slice(&available[..n]);
        Pin::new(&mut self.inner).consume(n);
        Poll::Ready(Ok(n))
    }
}

impl<R: AsyncBufRead + Unpin> AsyncRead for BodyReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            match this.state {
                State::Done => return Poll::Ready(Ok(())),
                State::UntilClose => return Pin::new(&mut this.inner).poll_read(cx, buf),
                State::Length(remaining) => {
                    let n = ready!(this.poll_copy(cx, buf, remaining))? as u64;
                    this.state = if n == remaining {
                        State::Done
                    } else {
                        State::Length(remaining - n)
                    };
                    return Poll::Ready(Ok(()));
                }
                State::ChunkSize => {
                    ready!(this.poll_line(cx))?;
                    let size = this.parse_chunk_size()?;
                    this.line.clear();
                    this.state = if size == 0 {
                        State::Trailer
                    } else {
                        State::ChunkData(size)
                    };
                }
                State::ChunkData(remaining) => {
                    let n = ready!(this.poll_copy(cx, buf, remaining))? as u64;
                    this.state = if n == remaining {
                        State::ChunkEnd
                    } else {
                        State::ChunkData(remaining - n)
                    };
                    return Poll::Ready(Ok(()));
                }
                State::ChunkEnd => {
                    ready!(this.poll_line(cx))?;
                    if !this.line.is_empty() {
                        return Poll::Ready(Err(invalid_chunk("missing CRLF after chunk data")));
                    }
                    this.state = State::ChunkSize;
                }
                State::Trailer => {
                    ready!(this.poll_line(cx))?;
                    let end = this.line.is_empty();
                    this.line.clear();
                    if end {
                        this.state = State::Done;
                    }
                }
            }
        }
    }
}

fn invalid_chunk(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
