use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error type used for transport and body failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Request phase that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimeoutPhase {
    /// DNS resolution, TCP dial and TLS handshake
    Connect,
    /// Waiting for the response status line and headers
    ResponseHeaders,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("connect"),
            Self::ResponseHeaders => f.write_str("response header"),
        }
    }
}

/// Classification of URL validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Errors returned by a GET.
///
/// Timeouts always render with the word "timeout" in their message; prefer
/// [`GetError::is_timeout`] over matching on the text.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GetError {
    /// A request phase exceeded the configured timeout
    #[error("{phase} timeout after {after:?}")]
    Timeout { phase: TimeoutPhase, after: Duration },

    /// Transport error (connection refused, DNS, TLS, protocol)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// Invalid URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        /// Diagnostic message, format is not stable
        reason: String,
    },

    /// URL scheme other than http/https
    #[error("URL scheme '{scheme}' not supported: only http:// and https:// are")]
    InvalidScheme { scheme: String },

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),
}

impl GetError {
    /// True when any request phase timed out
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The phase that timed out, if this is a timeout
    #[must_use]
    pub fn timeout_phase(&self) -> Option<TimeoutPhase> {
        match self {
            Self::Timeout { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// Raised by the connector when dial plus TLS handshake run out of time.
///
/// Surfaces inside hyper's connect error and is mapped to
/// [`GetError::Timeout`] with [`TimeoutPhase::Connect`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("connect timeout after {0:?}")]
pub struct ConnectTimeout(pub Duration);

/// Raised when response headers do not arrive in time once the connection is ready.
///
/// Mapped to [`GetError::Timeout`] with [`TimeoutPhase::ResponseHeaders`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("response header timeout after {0:?}")]
pub struct HeaderTimeout(pub Duration);

/// Fetch failure inside [`wrap_get`](crate::HttpGetter::wrap_get).
///
/// Keeps the URL next to the underlying [`GetError`], which stays reachable
/// through [`source`](std::error::Error::source) and [`FetchError::get_error`].
#[derive(Error, Debug)]
#[error("GET {url}: {source}")]
pub struct FetchError {
    url: String,
    #[source]
    source: GetError,
}

impl FetchError {
    #[must_use]
    pub fn new(url: impl Into<String>, source: GetError) -> Self {
        Self {
            url: url.into(),
            source,
        }
    }

    /// URL that was being fetched
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The underlying GET failure
    #[must_use]
    pub fn get_error(&self) -> &GetError {
        &self.source
    }

    #[must_use]
    pub fn into_get_error(self) -> GetError {
        self.source
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }
}

/// Errors from reading a response body
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BodyError {
    /// The body was closed; no further bytes can be read
    #[error("read on closed response body")]
    Closed,

    /// The underlying stream failed
    #[error("failed to read response body: {0}")]
    Read(#[source] BoxError),
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_timeout_messages_mention_timeout() {
        for phase in [TimeoutPhase::Connect, TimeoutPhase::ResponseHeaders] {
            let err = GetError::Timeout {
                phase,
                after: Duration::from_millis(10),
            };
            assert!(err.to_string().to_lowercase().contains("timeout"), "{err}");
            assert!(err.is_timeout());
            assert_eq!(err.timeout_phase(), Some(phase));
        }
        assert!(
            ConnectTimeout(Duration::from_secs(1))
                .to_string()
                .contains("timeout")
        );
        assert_eq!(
            HeaderTimeout(Duration::from_secs(1)).to_string(),
            "response header timeout after 1s"
        );
    }

    #[test]
    fn test_transport_error_preserves_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = GetError::Transport(Box::new(inner));
        assert!(!err.is_timeout());

        let source = err.source().unwrap();
        let io = source.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_fetch_error_keeps_url_and_chain() {
        let err = FetchError::new(
            "http://example.test/",
            GetError::Timeout {
                phase: TimeoutPhase::ResponseHeaders,
                after: Duration::from_secs(3),
            },
        );
        assert_eq!(err.url(), "http://example.test/");
        assert!(err.is_timeout());
        assert!(err.to_string().contains("timeout"));
        assert!(err.to_string().starts_with("GET http://example.test/"));

        let source = err.source().unwrap();
        assert!(source.downcast_ref::<GetError>().is_some());
        assert!(err.into_get_error().is_timeout());
    }

    #[test]
    fn test_body_closed_message() {
        assert_eq!(
            BodyError::Closed.to_string(),
            "read on closed response body"
        );
    }
}
