//! Non-pooling HTTP/HTTPS client transport.
//!
//! Every request gets a fresh connection that is closed once the response
//! body is done with, so each exchange has its own timeouts.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller
//!     │ Request<Bytes>
//!     ▼
//! ┌────────────────────┐   wait for admission (optional)
//! │ ThrottleTransport  │── resilience::throttle
//! └─────────┬──────────┘
//!           ▼
//! ┌────────────────────┐   validate target before any I/O
//! │  SimpleTransport   │── http::request
//! └─────────┬──────────┘
//!           ▼
//! ┌────────────────────┐   TCP → inactivity timeout → absolute timeout → TLS
//! │   net::Dialer      │── resilience::timeouts, net::tls
//! └─────────┬──────────┘
//!           ▼
//! ┌────────────────────┐   concurrent write/read halves, gzip
//! │  http::exchange    │── http::codec, http::body, http::decode
//! └─────────┬──────────┘
//!           ▼
//!   Response<ResponseBody>  (closing the body closes the connection)
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod transport;

pub use crate::config::{ThrottleOptions, TransportConfig};
pub use crate::error::{InvalidRequest, TransportError, TransportResult};
pub use crate::http::ResponseBody;
pub use crate::resilience::ReadTimeout;
pub use crate::transport::{RoundTrip, SimpleTransport, ThrottleTransport};
