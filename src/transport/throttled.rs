//! Admission-throttled transport.
//!
//! Every round trip first waits for a token from a shared limiter, then runs
//! on the inner transport. Admitted exchanges run concurrently; only
//! admission is serialized.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{Request, Response};

use crate::config::validation::{validate_throttle_rate, ValidationError};
use crate::config::ThrottleOptions;
use crate::error::TransportError;
use crate::http::response::ResponseBody;
use crate::resilience::throttle::Throttler;
use crate::transport::{RoundTrip, SimpleTransport};

/// Throttle category every round trip is admitted under.
pub const REQUEST_KEY: &str = "request";

/// Wraps a transport with a minimum interval between admissions.
///
/// Clones share one limiter.
#[derive(Clone)]
pub struct ThrottleTransport<T = SimpleTransport> {
    inner: T,
    throttler: Arc<Throttler>,
    total_tokens: usize,
}

impl ThrottleTransport<SimpleTransport> {
    /// Throttled [`SimpleTransport`] built from `options`.
    pub fn new(options: ThrottleOptions) -> Result<Self, ValidationError> {
        Self::wrap(
            SimpleTransport::new(options.transport_config()),
            options.throttle_rate,
            options.total_tokens,
        )
    }
}

impl<T: RoundTrip> ThrottleTransport<T> {
    /// Throttle `inner`. Fails if `rate` is below one second.
    pub fn wrap(inner: T, rate: Duration, total_tokens: usize) -> Result<Self, ValidationError> {
        validate_throttle_rate(rate)?;
        Ok(Self {
            inner,
            throttler: Arc::new(Throttler::new(rate)),
            total_tokens: total_tokens.max(1),
        })
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn throttle_rate(&self) -> Duration {
        self.throttler.interval()
    }

    async fn send(&self, request: Request<Bytes>) -> Result<Response<ResponseBody>, TransportError> {
        self.throttler.wait(REQUEST_KEY, 1, self.total_tokens).await;
        self.inner.round_trip(request).await
    }
}

impl<T: RoundTrip> RoundTrip for ThrottleTransport<T> {
    fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, TransportError>> {
        self.send(request).boxed()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ThrottleTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleTransport")
            .field("inner", &self.inner)
            .field("throttle_rate", &self.throttler.interval())
            .field("total_tokens", &self.total_tokens)
            .finish()
    }
}
