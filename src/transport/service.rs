//! `tower::Service` adapters so transports compose with tower middleware.

use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{Request, Response};
use tower::Service;

use crate::error::TransportError;
use crate::http::response::ResponseBody;
use crate::transport::{RoundTrip, SimpleTransport, ThrottleTransport};

impl Service<Request<Bytes>> for SimpleTransport {
    type Response = Response<ResponseBody>;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let transport = self.clone();
        async move { transport.round_trip(request).await }.boxed()
    }
}

/// Always ready; the throttle wait happens inside the call future.
impl<T> Service<Request<Bytes>> for ThrottleTransport<T>
where
    T: RoundTrip + Clone + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let transport = self.clone();
        async move { transport.round_trip(request).await }.boxed()
    }
}
