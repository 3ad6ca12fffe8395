//! Configuration schema definitions.
//!
//! This module defines the file-level configuration of the client.
//! All types derive Serde traits for deserialization from config files;
//! durations are given in milliseconds, zero meaning disabled.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::runtime::{ThrottleOptions, TransportConfig};

/// Root configuration of the client.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
    /// Timeouts applied to every exchange.
    pub timeouts: TimeoutSettings,

    /// Admission throttling. Absent means unthrottled.
    pub throttle: Option<ThrottleSettings>,

    /// Extra trust anchors.
    pub tls: TlsSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ClientSettings {
    pub fn transport_config(&self) -> TransportConfig {
        self.timeouts.transport_config()
    }

    /// Throttle options, when a `[throttle]` section is present.
    pub fn throttle_options(&self) -> Option<ThrottleOptions> {
        self.throttle.as_ref().map(|throttle| ThrottleOptions {
            throttle_rate: Duration::from_millis(throttle.rate_ms),
            read_timeout: Duration::from_millis(self.timeouts.read_ms),
            request_timeout: Duration::from_millis(self.timeouts.request_ms),
            connection_timeout: Duration::from_millis(self.timeouts.connect_ms),
            total_tokens: throttle.total_tokens,
        })
    }
}

/// Timeout configuration, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Sliding inactivity bound on reads.
    pub read_ms: u64,

    /// Bound on establishing the connection.
    pub connect_ms: u64,

    /// Absolute bound on the whole exchange.
    pub request_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            read_ms: 0,
            connect_ms: 10_000,
            request_ms: 0,
        }
    }
}

impl TimeoutSettings {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(
            Duration::from_millis(self.read_ms),
            Duration::from_millis(self.connect_ms),
            Duration::from_millis(self.request_ms),
        )
    }
}

/// Admission throttling configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ThrottleSettings {
    /// Minimum interval between admissions. At least 1000.
    pub rate_ms: u64,

    /// Admissions that may accumulate while idle.
    #[serde(default = "default_total_tokens")]
    pub total_tokens: usize,
}

fn default_total_tokens() -> usize {
    1
}

/// Additional trust anchors for `https`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TlsSettings {
    /// PEM bundles trusted on top of the bundled webpki roots.
    pub extra_root_certs: Vec<PathBuf>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
