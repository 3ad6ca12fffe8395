//! Connection establishment.
//!
//! # Responsibilities
//! - Compute the canonical dial address
//! - Open the raw connection within the dial timeout
//! - Layer the read timeouts in their required order
//! - Negotiate TLS for `https` targets
//!
//! # Design Decisions
//! - The raw connector is a trait so tests can dial in-memory peers
//! - A connection that fails any step is dropped (closed) before returning

use std::io;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::http::request::Target;
use crate::net::connection::{BoxIo, Connection, ConnectionTracker};
use crate::net::tls;
use crate::observability::metrics;
use crate::resilience::timeouts::{AbsoluteTimeout, InactivityTimeout};

/// Opens raw byte streams to `host:port` addresses.
pub trait Connect: Send + Sync + 'static {
    fn connect<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, io::Result<BoxIo>>;
}

/// Plain TCP via Tokio, resolving names with the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connect for TcpConnector {
    fn connect<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, io::Result<BoxIo>> {
        async move {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as BoxIo)
        }
        .boxed()
    }
}

/// Produces connections ready for one exchange.
#[derive(Clone)]
pub struct Dialer {
    config: TransportConfig,
    connector: Arc<dyn Connect>,
    tls: TlsConnector,
    tracker: ConnectionTracker,
}

impl Dialer {
    pub fn new(
        config: TransportConfig,
        connector: Arc<dyn Connect>,
        tls: TlsConnector,
        tracker: ConnectionTracker,
    ) -> Self {
        Self {
            config,
            connector,
            tls,
            tracker,
        }
    }

    /// Replace the TLS client used for `https` targets.
    pub fn with_tls(mut self, tls: TlsConnector) -> Self {
        self.tls = tls;
        self
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub async fn dial(&self, target: &Target) -> Result<Connection, TransportError> {
        let addr = target.canonical_addr();
        let outcome = self.dial_addr(target, &addr).await;

        let label = match &outcome {
            Ok(_) => "ok",
            Err(err) if err.is_timeout() => "timeout",
            Err(_) => "error",
        };
        metrics::record_dial(target.scheme().as_str(), label);
        outcome
    }

    async fn dial_addr(&self, target: &Target, addr: &str) -> Result<Connection, TransportError> {
        let raw = self.connect(addr).await?;
        let guard = self.tracker.track();
        tracing::debug!(connection_id = %guard.id(), addr, "Connected");

        let io = self.wrap_timeouts(raw);
        let io = if target.scheme().is_tls() {
            Box::new(tls::handshake(&self.tls, io, target.server_name()).await?) as BoxIo
        } else {
            io
        };

        Ok(Connection::new(io, guard))
    }

    async fn connect(&self, addr: &str) -> Result<BoxIo, TransportError> {
        let timeout = self.config.connection_timeout();
        let connecting = self.connector.connect(addr);
        let result = if timeout.is_zero() {
            connecting.await
        } else {
            tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_| TransportError::DialTimeout {
                    addr: addr.to_owned(),
                    timeout,
                })?
        };
        result.map_err(|source| TransportError::Dial {
            addr: addr.to_owned(),
            source,
        })
    }

    /// Sliding policy first, absolute policy around it.
    fn wrap_timeouts(&self, raw: BoxIo) -> BoxIo {
        let read_timeout = self.config.read_timeout();
        if read_timeout.is_zero() {
            return raw;
        }
        let sliding = InactivityTimeout::new(raw, read_timeout);

        let request_timeout = self.config.request_timeout();
        if request_timeout.is_zero() {
            Box::new(sliding)
        } else {
            Box::new(AbsoluteTimeout::new(sliding, request_timeout))
        }
    }
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("config", &self.config)
            .field("open_connections", &self.tracker.active_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::sync::Mutex;

    /// Hands out pre-made duplex streams and remembers the addresses asked for.
    struct ScriptedConnector {
        addrs: std::sync::Mutex<Vec<String>>,
        peers: Mutex<Vec<DuplexStream>>,
    }

    impl ScriptedConnector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                addrs: std::sync::Mutex::new(Vec::new()),
                peers: Mutex::new(Vec::new()),
            })
        }
    }

    impl Connect for ScriptedConnector {
        fn connect<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, io::Result<BoxIo>> {
            async move {
                self.addrs.lock().unwrap().push(addr.to_owned());
                let (client, server) = tokio::io::duplex(1024);
                self.peers.lock().await.push(server);
                Ok(Box::new(client) as BoxIo)
            }
            .boxed()
        }
    }

    struct HangingConnector;

    impl Connect for HangingConnector {
        fn connect<'a>(&'a self, _addr: &'a str) -> BoxFuture<'a, io::Result<BoxIo>> {
            futures_util::future::pending().boxed()
        }
    }

    struct RefusingConnector;

    impl Connect for RefusingConnector {
        fn connect<'a>(&'a self, _addr: &'a str) -> BoxFuture<'a, io::Result<BoxIo>> {
            async { Err(io::Error::from(io::ErrorKind::ConnectionRefused)) }.boxed()
        }
    }

    fn dialer(config: TransportConfig, connector: Arc<dyn Connect>) -> Dialer {
        Dialer::new(
            config,
            connector,
            TlsConnector::from(tls::default_client_config()),
            ConnectionTracker::new(),
        )
    }

    fn target(uri: &str) -> Target {
        Target::from_uri(&uri.parse().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn dials_canonical_address() {
        let connector = ScriptedConnector::new();
        let dialer = dialer(TransportConfig::default(), connector.clone());

        let conn = dialer.dial(&target("http://example.com/x")).await.unwrap();
        assert_eq!(dialer.tracker.active_count(), 1);
        assert_eq!(connector.addrs.lock().unwrap().as_slice(), ["example.com:80"]);

        drop(conn);
        assert_eq!(dialer.tracker.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dial_timeout_is_classified() {
        let config = TransportConfig::default().with_connection_timeout(Duration::from_secs(3));
        let dialer = dialer(config, Arc::new(HangingConnector));

        let err = dialer.dial(&target("http://example.com")).await.unwrap_err();
        assert!(matches!(err, TransportError::DialTimeout { ref addr, .. } if addr == "example.com:80"));
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn refused_dial_is_a_dial_error() {
        let dialer = dialer(TransportConfig::default(), Arc::new(RefusingConnector));
        let err = dialer.dial(&target("http://example.com:9")).await.unwrap_err();
        assert!(matches!(err, TransportError::Dial { .. }));
        assert!(!err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn request_timeout_alone_arms_inactivity() {
        let config = TransportConfig::default().with_request_timeout(Duration::from_secs(5));
        let connector = ScriptedConnector::new();
        let dialer = dialer(config, connector.clone());

        let conn = dialer.dial(&target("http://example.com")).await.unwrap();
        let (mut io, _guard) = conn.into_parts();

        let started = tokio::time::Instant::now();
        let mut buf = [0u8; 1];
        let err = io.read(&mut buf).await.unwrap_err();
        let timeout = crate::resilience::ReadTimeout::from_io(&err).unwrap();

        assert_eq!(timeout, crate::resilience::ReadTimeout::Inactivity(Duration::from_secs(5)));
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn failed_handshake_closes_the_connection() {
        let connector = ScriptedConnector::new();
        let dialer = dialer(TransportConfig::default(), connector.clone());

        // Dropping the peer makes the handshake fail on EOF.
        let target = target("https://example.com");
        let dialing = dialer.dial(&target);
        let peers = Arc::clone(&connector);
        let (result, ()) = tokio::join!(dialing, async move {
            loop {
                if let Some(peer) = peers.peers.lock().await.pop() {
                    drop(peer);
                    break;
                }
                tokio::task::yield_now().await;
            }
        });

        assert!(matches!(result, Err(TransportError::Handshake { .. })));
        assert_eq!(dialer.tracker.active_count(), 0);
        assert_eq!(connector.addrs.lock().unwrap().as_slice(), ["example.com:443"]);
    }
}
