//! HTTP/1.1 client protocol handling.
//!
//! # Data Flow
//! ```text
//! Request<Bytes>
//!     → request.rs (target: scheme, host, port)
//!     → codec.rs (request head out, response head in)
//!     → exchange.rs (concurrent write/read over one connection)
//!     → body.rs (length, chunked or close-delimited framing)
//!     → decode.rs (transparent gzip)
//!     → response.rs (body bound to the connection)
//! ```
//!
//! # Design Decisions
//! - One request per connection; `Connection: close` is always offered
//! - Bodies stream; nothing past the head is buffered unless asked for

pub mod body;
pub mod codec;
pub mod decode;
pub mod exchange;
pub mod request;
pub mod response;

pub use exchange::exchange;
pub use request::{Scheme, Target};
pub use response::ResponseBody;
