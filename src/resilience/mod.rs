//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request admission:
//!     → throttle.rs (wait for a token under the request category)
//!
//! Response reads:
//!     → timeouts.rs (absolute deadline checked first)
//!     → timeouts.rs (sliding inactivity deadline underneath)
//!     → raw connection
//! ```
//!
//! # Design Decisions
//! - Bounding is timeout-only; there is no cancellation token
//! - No retries: one attempt per call, the caller owns retry policy
//! - Timeout errors are distinct from other errors

pub mod throttle;
pub mod timeouts;

pub use throttle::Throttler;
pub use timeouts::{AbsoluteTimeout, InactivityTimeout, ReadTimeout};
