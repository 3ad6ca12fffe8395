//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound idle time between reads (sliding inactivity deadline)
//! - Bound total read time of an exchange (absolute deadline)
//! - Report which bound fired through the `io::Error` payload
//!
//! # Design Decisions
//! - Only reads are time-boxed; the write half is expected to be fast
//!   relative to waiting on the remote server
//! - `AbsoluteTimeout` must wrap `InactivityTimeout`, never the reverse.
//!   The absolute check only runs when a read starts, so a stalled read
//!   underneath is released by the inactivity deadline first. Worst case
//!   the exchange fails after about `2 × request_timeout`.
//! - Deadlines use Tokio's clock

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

/// Which read bound expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadTimeout {
    /// No data arrived within the sliding window.
    #[error("read inactivity timeout after {0:?}")]
    Inactivity(Duration),

    /// The exchange outlived its absolute deadline.
    #[error("connection timeout: exchange exceeded {0:?}")]
    Absolute(Duration),
}

impl ReadTimeout {
    /// Recover the timeout that produced `err`, if any.
    pub fn from_io(err: &io::Error) -> Option<Self> {
        if err.kind() != io::ErrorKind::TimedOut {
            return None;
        }
        err.get_ref()?.downcast_ref::<ReadTimeout>().copied()
    }
}

impl From<ReadTimeout> for io::Error {
    fn from(timeout: ReadTimeout) -> Self {
        io::Error::new(io::ErrorKind::TimedOut, timeout)
    }
}

/// A stream that fails reads after `period` with no data received.
///
/// The deadline is armed on construction and re-armed after every
/// successful read.
pub struct InactivityTimeout<S> {
    inner: S,
    period: Duration,
    deadline: Pin<Box<Sleep>>,
}

impl<S> InactivityTimeout<S> {
    pub fn new(inner: S, period: Duration) -> Self {
        Self {
            inner,
            period,
            deadline: Box::pin(tokio::time::sleep(period)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for InactivityTimeout<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let next = Instant::now() + this.period;
                this.deadline.as_mut().reset(next);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Pending => match this.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => Poll::Ready(Err(ReadTimeout::Inactivity(this.period).into())),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for InactivityTimeout<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// A stream that refuses reads once a fixed wall-clock deadline has passed.
///
/// Must wrap an [`InactivityTimeout`], or a hung peer may never let a read
/// return to reach the check.
pub struct AbsoluteTimeout<S> {
    inner: S,
    timeout: Duration,
    deadline: Instant,
}

impl<S> AbsoluteTimeout<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for AbsoluteTimeout<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if Instant::now() > self.deadline {
            return Poll::Ready(Err(ReadTimeout::Absolute(self.timeout).into()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for AbsoluteTimeout<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
