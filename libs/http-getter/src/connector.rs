//! Connector wrapper bounding connection establishment.
//!
//! `HttpConnector::set_connect_timeout` only covers the TCP dial of a single
//! resolved address. Wrapping the whole HTTPS connector puts DNS, every dial
//! attempt and the TLS handshake under the same phase timeout. Start and end
//! of the connect are reported to the request's header-wait clock.

use crate::error::{BoxError, ConnectTimeout};
use crate::header_timeout::ConnectClock;
use http::Uri;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// Boxed connect future; boxed so hyper's `Unpin` requirement on connector futures holds.
pub type ConnectFuture<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send>>;

/// Connector that fails with [`ConnectTimeout`] once `timeout` elapses.
#[derive(Clone, Debug)]
pub struct TimeoutConnector<C> {
    inner: C,
    timeout: Duration,
}

impl<C> TimeoutConnector<C> {
    #[must_use]
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<C> Service<Uri> for TimeoutConnector<C>
where
    C: Service<Uri>,
    C::Response: Send + 'static,
    C::Error: Into<BoxError>,
    C::Future: Send + 'static,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future = ConnectFuture<C::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let timeout = self.timeout;
        let clock = ConnectClock::current();
        if let Some(clock) = &clock {
            clock.mark_started();
        }
        let connecting = self.inner.call(uri);

        Box::pin(async move {
            let connected = match tokio::time::timeout(timeout, connecting).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(Box::new(ConnectTimeout(timeout)) as BoxError),
            };
            if let (Ok(_), Some(clock)) = (&connected, &clock) {
                clock.mark_ready();
            }
            connected
        })
    }
}
