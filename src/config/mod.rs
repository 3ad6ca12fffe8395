//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientSettings (validated, immutable)
//!     → runtime.rs (TransportConfig / ThrottleOptions handed to transports)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod runtime;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use runtime::{ThrottleOptions, TransportConfig};
pub use schema::{ClientSettings, ObservabilityConfig};
pub use validation::ValidationError;
