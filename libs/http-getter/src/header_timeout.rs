//! Response-header timeout measured from the moment the connection is ready.
//!
//! Each request attempt runs with its own [`ConnectClock`] in task-local
//! scope. When the pool has to dial, [`TimeoutConnector`](crate::TimeoutConnector)
//! marks the start and the end of the connect on it, and the header wait is
//! bounded from the end. A request served by a pooled connection carries no
//! marks and is bounded from dispatch.

use crate::error::{BoxError, HeaderTimeout};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::{Layer, Service};

tokio::task_local! {
    static CONNECT_CLOCK: ConnectClock;
}

#[derive(Debug, Default, Clone, Copy)]
struct ConnectMarks {
    started: Option<Instant>,
    ready: Option<Instant>,
}

/// Connect progress of one request attempt
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectClock(Arc<Mutex<ConnectMarks>>);

impl ConnectClock {
    /// Clock of the request attempt the current task is driving, if any
    pub(crate) fn current() -> Option<Self> {
        CONNECT_CLOCK.try_with(Clone::clone).ok()
    }

    pub(crate) fn mark_started(&self) {
        let mut marks = self.0.lock();
        marks.started = Some(Instant::now());
        marks.ready = None;
    }

    pub(crate) fn mark_ready(&self) {
        self.0.lock().ready = Some(Instant::now());
    }

    /// Deadline for the response headers of an attempt dispatched at `dispatched`.
    fn header_deadline(&self, dispatched: Instant, timeout: Duration) -> Instant {
        let marks = *self.0.lock();
        match (marks.started, marks.ready) {
            (_, Some(ready)) => ready.max(dispatched) + timeout,
            // connect in flight: the connector fails it at `started + timeout`
            (Some(started), None) => started + timeout + timeout,
            (None, None) => dispatched + timeout,
        }
    }
}

/// Layer bounding the wait for response headers, see [`HeaderTimeoutService`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderTimeoutLayer {
    timeout: Duration,
}

impl HeaderTimeoutLayer {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for HeaderTimeoutLayer {
    type Service = HeaderTimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HeaderTimeoutService {
            inner,
            timeout: self.timeout,
        }
    }
}

/// Fails a request with [`HeaderTimeout`] when its response does not arrive
/// within the timeout after the connection became ready.
#[derive(Debug, Clone)]
pub(crate) struct HeaderTimeoutService<S> {
    inner: S,
    timeout: Duration,
}

impl<S, Req> Service<Req> for HeaderTimeoutService<S>
where
    S: Service<Req>,
    S::Response: Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let timeout = self.timeout;
        let clock = ConnectClock::default();
        let response = CONNECT_CLOCK.scope(clock.clone(), self.inner.call(req));

        Box::pin(async move {
            let dispatched = Instant::now();
            let sleep = tokio::time::sleep_until(dispatched + timeout);
            tokio::pin!(response, sleep);

            loop {
                tokio::select! {
                    result = &mut response => return result.map_err(Into::into),
                    () = &mut sleep => {
                        let deadline = clock.header_deadline(dispatched, timeout);
                        if deadline <= Instant::now() {
                            tracing::debug!(?timeout, "response headers did not arrive in time");
                            return Err(HeaderTimeout(timeout).into());
                        }
                        sleep.as_mut().reset(deadline);
                    }
                }
            }
        })
    }
}
