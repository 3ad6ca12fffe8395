//! Error taxonomy for the transport.
//!
//! Every failure is returned to the immediate caller. Nothing here is
//! retried or logged; the caller owns retry policy.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::resilience::timeouts::ReadTimeout;

/// Result alias used throughout the transport.
pub type TransportResult<T> = Result<T, TransportError>;

/// Malformed request shape, detected before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRequest {
    #[error("http: nil Request.URL")]
    MissingUrl,

    #[error("http: unsupported protocol scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("http: no Host in request URL")]
    MissingHost,
}

/// Errors produced by a single round trip.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequest),

    #[error("dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("dial {addr}: timed out after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),

    #[error("TLS handshake with {host}: {source}")]
    Handshake {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("certificate is not valid for {host}: {reason}")]
    HostnameMismatch { host: String, reason: String },

    #[error("write request: {0}")]
    Write(#[source] io::Error),

    #[error("read response: {0}")]
    Read(#[source] io::Error),

    #[error(transparent)]
    Timeout(#[from] ReadTimeout),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("gzip response body: {0}")]
    Decode(#[source] io::Error),
}

impl TransportError {
    /// Classify an I/O error raised while reading the response.
    ///
    /// Timeouts raised by the connection wrappers become [`TransportError::Timeout`].
    pub fn read(err: io::Error) -> Self {
        match ReadTimeout::from_io(&err) {
            Some(timeout) => Self::Timeout(timeout),
            None => Self::Read(err),
        }
    }

    /// Classify an I/O error raised while priming the gzip decoder.
    pub(crate) fn decode(err: io::Error) -> Self {
        match ReadTimeout::from_io(&err) {
            Some(timeout) => Self::Timeout(timeout),
            None => Self::Decode(err),
        }
    }

    /// True for dial, inactivity and absolute timeouts.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::DialTimeout { .. } | Self::Timeout(_) => true,
            Self::Dial { source, .. } | Self::Handshake { source, .. } => {
                source.kind() == io::ErrorKind::TimedOut
            }
            Self::Write(err) | Self::Read(err) | Self::Decode(err) => {
                err.kind() == io::ErrorKind::TimedOut
            }
            _ => false,
        }
    }

    /// True when the request never left the caller.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}
