//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Target
//!     → dial.rs (canonical address, connect within the dial timeout)
//!     → timeouts (inactivity, then absolute, around the raw stream)
//!     → tls.rs (handshake and hostname check for https)
//!     → connection.rs (boxed stream + lifecycle guard)
//!     → Hand off to the exchange
//! ```
//!
//! # Design Decisions
//! - Every connection carries one exchange and is then closed
//! - Each connection is tracked so leaked ones show up in the open count
//! - TLS is layered over the timeout wrappers, so handshake reads are bounded too

pub mod connection;
pub mod dial;
pub mod tls;

pub use connection::{BoxIo, Connection, ConnectionId, ConnectionTracker};
pub use dial::{Connect, Dialer, TcpConnector};
