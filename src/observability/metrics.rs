//! Metrics collection.
//!
//! # Metrics
//! - `transport_dials_total` (counter): dials by scheme and outcome
//! - `transport_exchanges_total` (counter): exchanges by outcome
//! - `transport_exchange_duration_seconds` (histogram): time to response head
//! - `transport_throttle_wait_seconds` (histogram): admission delay
//! - `transport_connections_open` (gauge): connections currently open
//!
//! # Design Decisions
//! - Only the `metrics` facade is used; installing an exporter is the
//!   embedding application's call
//! - Outcome labels are a closed set: `ok`, `timeout`, `error`

use std::time::Duration;

use metrics::{counter, gauge, histogram};

pub const DIALS_TOTAL: &str = "transport_dials_total";
pub const EXCHANGES_TOTAL: &str = "transport_exchanges_total";
pub const EXCHANGE_DURATION: &str = "transport_exchange_duration_seconds";
pub const THROTTLE_WAIT: &str = "transport_throttle_wait_seconds";
pub const CONNECTIONS_OPEN: &str = "transport_connections_open";

pub fn record_dial(scheme: &'static str, outcome: &'static str) {
    counter!(DIALS_TOTAL, "scheme" => scheme, "outcome" => outcome).increment(1);
}

pub fn record_exchange(outcome: &'static str, elapsed: Duration) {
    counter!(EXCHANGES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(EXCHANGE_DURATION).record(elapsed.as_secs_f64());
}

pub fn record_throttle_wait(waited: Duration) {
    histogram!(THROTTLE_WAIT).record(waited.as_secs_f64());
}

pub fn inc_connections() {
    gauge!(CONNECTIONS_OPEN).increment(1.0);
}

pub fn dec_connections() {
    gauge!(CONNECTIONS_OPEN).decrement(1.0);
}
