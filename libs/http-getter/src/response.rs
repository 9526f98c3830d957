use crate::config::{BODY_DRAIN_LIMIT, DEFAULT_TIMEOUT};
use crate::error::{BodyError, BoxError};
use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode, Version};
use http_body::Body as _;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;

/// Type-erased response body stream.
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

enum BodyState {
    Open {
        stream: ResponseBody,
        /// Bytes of the last frame not yet handed out by `read`
        pending: Bytes,
        finished: bool,
    },
    Closed,
}

impl BodyState {
    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<Bytes>, BodyError>> {
        let Self::Open {
            stream,
            pending,
            finished,
        } = self
        else {
            return Poll::Ready(Err(BodyError::Closed));
        };

        if !pending.is_empty() {
            return Poll::Ready(Ok(Some(std::mem::take(pending))));
        }

        while !*finished {
            match ready!(Pin::new(&mut *stream).poll_frame(cx)) {
                Some(Ok(frame)) => {
                    // trailers carry no payload
                    if let Ok(data) = frame.into_data()
                        && !data.is_empty()
                    {
                        return Poll::Ready(Ok(Some(data)));
                    }
                }
                Some(Err(e)) => return Poll::Ready(Err(BodyError::Read(e))),
                None => *finished = true,
            }
        }
        Poll::Ready(Ok(None))
    }

    fn poll_read(&mut self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<Result<usize, BodyError>> {
        if buf.is_empty() {
            return match self {
                Self::Open { .. } => Poll::Ready(Ok(0)),
                Self::Closed => Poll::Ready(Err(BodyError::Closed)),
            };
        }

        let Some(mut chunk) = ready!(self.poll_chunk(cx))? else {
            return Poll::Ready(Ok(0));
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.advance(n);
        if let Self::Open { pending, .. } = self {
            *pending = chunk;
        }
        Poll::Ready(Ok(n))
    }
}

fn close_state(state: &Mutex<BodyState>) {
    let previous = std::mem::replace(&mut *state.lock(), BodyState::Closed);
    if matches!(previous, BodyState::Open { .. }) {
        tracing::trace!("response body closed");
    }
}

async fn next_chunk(state: &Mutex<BodyState>) -> Result<Option<Bytes>, BodyError> {
    std::future::poll_fn(|cx| state.lock().poll_chunk(cx)).await
}

/// Reads the rest of the stream. `Ok(false)` means more than `limit` bytes were left.
async fn drain(state: &Mutex<BodyState>, limit: usize) -> Result<bool, BodyError> {
    let mut drained = 0usize;
    while let Some(chunk) = next_chunk(state).await? {
        drained += chunk.len();
        if drained > limit {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn drain_then_close(state: &Mutex<BodyState>, limit: usize, timeout: Duration) {
    match tokio::time::timeout(timeout, drain(state, limit)).await {
        Ok(Ok(true) | Err(BodyError::Closed)) => {}
        Ok(Ok(false)) => {
            tracing::debug!(limit, "response body exceeds drain limit; connection not reused");
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "failed to drain response body");
        }
        Err(_) => {
            tracing::debug!(?timeout, "timed out draining response body");
        }
    }
    close_state(state);
}

/// Response body stream.
///
/// The body must be read to the end and closed for its connection to return
/// to the pool. [`Body::close`] drains up to [`BODY_DRAIN_LIMIT`] bytes first.
/// Dropping an unclosed body releases it without draining, so the connection
/// is discarded instead of reused.
///
/// Reads on a closed body fail with [`BodyError::Closed`].
pub struct Body {
    state: Arc<Mutex<BodyState>>,
    drain_timeout: Duration,
}

impl Body {
    /// Wrap any `http_body::Body` producing `Bytes`.
    #[must_use]
    pub fn new<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        Self::with_drain_timeout(body, DEFAULT_TIMEOUT)
    }

    pub(crate) fn with_drain_timeout<B>(body: B, drain_timeout: Duration) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let stream: ResponseBody = body.map_err(Into::into).boxed();
        Self {
            state: Arc::new(Mutex::new(BodyState::Open {
                stream,
                pending: Bytes::new(),
                finished: false,
            })),
            drain_timeout,
        }
    }

    /// Read up to `buf.len()` bytes. Returns `Ok(0)` at end of stream.
    ///
    /// # Errors
    /// Returns [`BodyError::Closed`] if the body was closed, nothing is
    /// written to `buf` in that case. Returns [`BodyError::Read`] if the
    /// underlying stream fails.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, BodyError> {
        std::future::poll_fn(|cx| self.state.lock().poll_read(cx, buf)).await
    }

    /// Read the remainder of the body.
    ///
    /// # Errors
    /// Returns [`BodyError::Closed`] if the body was closed or
    /// [`BodyError::Read`] if the stream fails.
    pub async fn bytes(&mut self) -> Result<Bytes, BodyError> {
        let mut collected = BytesMut::new();
        while let Some(chunk) = next_chunk(&self.state).await? {
            collected.extend_from_slice(&chunk);
        }
        Ok(collected.freeze())
    }

    /// Read the remainder of the body as UTF-8, replacing invalid sequences.
    ///
    /// # Errors
    /// Same as [`Body::bytes`].
    pub async fn text(&mut self) -> Result<String, BodyError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Drain what is left (up to [`BODY_DRAIN_LIMIT`] bytes) and close.
    ///
    /// Closing an already closed body does nothing.
    pub async fn close(self) {
        drain_then_close(&self.state, BODY_DRAIN_LIMIT, self.drain_timeout).await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), BodyState::Closed)
    }

    /// Guard closing this body when dropped, whoever holds the body by then.
    pub(crate) fn close_guard(&self) -> BodyCloseGuard {
        BodyCloseGuard {
            state: Arc::clone(&self.state),
            drain_timeout: self.drain_timeout,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Closes the guarded body on drop: normal return, error, panic or cancellation.
pub(crate) struct BodyCloseGuard {
    state: Arc<Mutex<BodyState>>,
    drain_timeout: Duration,
}

impl BodyCloseGuard {
    /// Drain the remainder so the connection can be reused, then close.
    pub(crate) async fn release(self) {
        drain_then_close(&self.state, BODY_DRAIN_LIMIT, self.drain_timeout).await;
    }
}

impl Drop for BodyCloseGuard {
    fn drop(&mut self) {
        close_state(&self.state);
    }
}

/// Result of a successful GET: status, headers and an open [`Body`].
#[derive(Debug)]
pub struct GetResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Body,
}

impl GetResponse {
    /// Build a response from any `http::Response`, e.g. canned responses in test doubles.
    #[must_use]
    pub fn new<B>(response: Response<B>) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        Self::with_drain_timeout(response, DEFAULT_TIMEOUT)
    }

    pub(crate) fn with_drain_timeout<B>(response: Response<B>, drain_timeout: Duration) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body: Body::with_drain_timeout(body, drain_timeout),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    #[must_use]
    pub fn into_body(self) -> Body {
        self.body
    }
}
