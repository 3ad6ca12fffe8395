//! Client transports.
//!
//! # Data Flow
//! ```text
//! Request<Bytes>
//!     → throttled.rs (optional: wait for admission)
//!     → SimpleTransport (validate target, before any I/O)
//!     → net::dial (fresh connection, timeouts, TLS)
//!     → http::exchange (write/read, decode)
//!     → Response<ResponseBody> owned by the caller
//! ```
//!
//! # Design Decisions
//! - No pooling: every round trip dials, and closing the body closes the socket
//! - Transports are cheap to clone; clones share the connection tracker
//! - Nothing is retried here; callers own retry policy

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{Request, Response};
use rustls::ClientConfig;
use tokio_rustls::TlsConnector;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::http::exchange::exchange;
use crate::http::request::Target;
use crate::http::response::ResponseBody;
use crate::net::connection::ConnectionTracker;
use crate::net::dial::{Connect, Dialer, TcpConnector};
use crate::net::tls;

pub mod service;
pub mod throttled;

pub use throttled::ThrottleTransport;

/// Executes one request and returns its response.
///
/// The response body owns the connection the exchange ran on; close or drop
/// it to release the connection.
pub trait RoundTrip: Send + Sync {
    fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, TransportError>>;
}

/// Non-pooling HTTP/1.1 transport: one connection per request.
#[derive(Clone, Debug)]
pub struct SimpleTransport {
    dialer: Dialer,
}

impl SimpleTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector))
    }

    /// Transport dialing through a custom connector.
    pub fn with_connector(config: TransportConfig, connector: Arc<dyn Connect>) -> Self {
        let dialer = Dialer::new(
            config,
            connector,
            TlsConnector::from(tls::default_client_config()),
            ConnectionTracker::new(),
        );
        Self { dialer }
    }

    /// Use `config` for `https` instead of the bundled webpki roots.
    pub fn with_tls_config(self, config: Arc<ClientConfig>) -> Self {
        Self {
            dialer: self.dialer.with_tls(TlsConnector::from(config)),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        self.dialer.config()
    }

    /// Tracker of the connections this transport (and its clones) has open.
    pub fn connections(&self) -> &ConnectionTracker {
        self.dialer.tracker()
    }

    async fn send(&self, request: Request<Bytes>) -> Result<Response<ResponseBody>, TransportError> {
        let target = Target::from_request(&request)?;
        tracing::debug!(
            method = %request.method(),
            addr = %target.canonical_addr(),
            "Starting round trip"
        );

        let conn = self.dialer.dial(&target).await?;
        exchange(conn, &target, request).await
    }
}

impl RoundTrip for SimpleTransport {
    fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, TransportError>> {
        self.send(request).boxed()
    }
}

impl<T: RoundTrip + ?Sized> RoundTrip for Arc<T> {
    fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, TransportError>> {
        (**self).round_trip(request)
    }
}
