//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dial / exchange / throttle produce:
//!     → tracing events (debug/trace, keyed by connection_id)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs (fmt subscriber for binaries)
//!     → whatever metrics recorder the application installs
//! ```
//!
//! # Design Decisions
//! - Errors are returned to callers, never logged above debug here
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
