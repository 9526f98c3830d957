use crate::error::{FetchError, GetError};
use crate::response::GetResponse;
use async_trait::async_trait;
use std::future::Future;

/// GET capability: a raw fetch and a fetch with a scoped body.
///
/// Implementors only provide [`get`](HttpGetter::get); [`wrap_get`](HttpGetter::wrap_get)
/// is built on it, so test doubles returning canned responses keep the same
/// body-closing guarantees as [`Getter`](crate::Getter).
///
/// `wrap_get` is generic over the callback, so the trait is used through
/// generic bounds (`impl HttpGetter`, `G: HttpGetter`) rather than `dyn`.
#[async_trait]
pub trait HttpGetter: Send + Sync {
    /// Fetch `url` with a single GET.
    ///
    /// The returned body is open and owned by the caller, who must read it to
    /// the end and close it (see [`Body::close`](crate::Body::close)) for the
    /// connection to be reused.
    ///
    /// # Errors
    /// Returns [`GetError::Timeout`] when a phase runs out of time, and
    /// [`GetError::Transport`], [`GetError::InvalidUri`] or
    /// [`GetError::InvalidScheme`] for other failures.
    async fn get(&self, url: &str) -> Result<GetResponse, GetError>;

    /// Fetch `url` and hand the response to `f`, closing the body afterwards.
    ///
    /// The body is closed exactly once before this returns, whether `f`
    /// succeeds, fails, panics or the call is cancelled. On the normal path
    /// the unread remainder is drained first so the connection can be reused.
    /// A body handle kept past the callback reads as closed.
    ///
    /// # Errors
    /// Returns the callback's error unchanged, or the fetch failure wrapped in
    /// [`FetchError`] and converted into `E`; `f` is not called in that case.
    async fn wrap_get<F, Fut, T, E>(&self, url: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(GetResponse) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<FetchError> + Send,
    {
        let response = self
            .get(url)
            .await
            .map_err(|source| FetchError::new(url, source))?;

        let guard = response.body().close_guard();
        let outcome = f(response).await;
        if outcome.is_ok() {
            guard.release().await;
        } else {
            // no drain: the error is reported without waiting on the body
            drop(guard);
        }
        outcome
    }
}
