//! Keyed admission throttling.
//!
//! A thin keyed front over `leaky_bucket::RateLimiter`. Token accounting is
//! entirely the limiter's business; this type only decides which bucket a
//! caller waits on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use leaky_bucket::RateLimiter;
use tokio::time::Instant;

use crate::observability::metrics;

/// Blocking "wait for N of M tokens under category K" limiter.
///
/// Each category gets its own bucket on first use. A bucket starts with a
/// single token, gains one token per `interval`, and never holds more than
/// `max` tokens.
pub struct Throttler {
    interval: Duration,
    buckets: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl Throttler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Grant interval between tokens.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Suspend until `tokens` tokens are granted from the `key` bucket.
    ///
    /// `max` only takes effect when the bucket is created. Waiters are
    /// released in arrival order.
    pub async fn wait(&self, key: &str, tokens: usize, max: usize) {
        let limiter = self.bucket(key, max);
        let started = Instant::now();
        limiter.acquire(tokens).await;
        let waited = started.elapsed();

        tracing::trace!(key, tokens, waited = ?waited, "Throttle granted");
        metrics::record_throttle_wait(waited);
    }

    fn bucket(&self, key: &str, max: usize) -> Arc<RateLimiter> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let limiter = buckets.entry(key.to_owned()).or_insert_with(|| {
            Arc::new(
                RateLimiter::builder()
                    .initial(1)
                    .refill(1)
                    .interval(self.interval)
                    .max(max.max(1))
                    .build(),
            )
        });
        Arc::clone(limiter)
    }
}
