//! Runtime transport settings.
//!
//! Built once at startup (directly or from the file schema) and read-only
//! afterwards. A zero duration disables the corresponding bound.

use std::time::Duration;

/// Timeouts applied to every exchange of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportConfig {
    read_timeout: Duration,
    connection_timeout: Duration,
    request_timeout: Duration,
}

impl TransportConfig {
    pub fn new(read_timeout: Duration, connection_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            read_timeout,
            connection_timeout,
            request_timeout,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Absolute bound on an exchange. Not exact: the realistic worst case is
    /// about twice this value.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sliding inactivity bound.
    ///
    /// When only a request timeout is configured, it doubles as the
    /// inactivity bound.
    pub fn read_timeout(&self) -> Duration {
        if self.read_timeout.is_zero() {
            self.request_timeout
        } else {
            self.read_timeout
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Settings for a throttled transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleOptions {
    /// Minimum time between admissions. Must be at least one second.
    pub throttle_rate: Duration,
    pub read_timeout: Duration,
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
    /// Most admissions that may accumulate while idle.
    pub total_tokens: usize,
}

impl ThrottleOptions {
    pub fn new(throttle_rate: Duration) -> Self {
        Self {
            throttle_rate,
            read_timeout: Duration::ZERO,
            request_timeout: Duration::ZERO,
            connection_timeout: Duration::ZERO,
            total_tokens: 1,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.read_timeout, self.connection_timeout, self.request_timeout)
    }
}
