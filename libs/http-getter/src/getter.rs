use crate::capability::HttpGetter;
use crate::config::{
    DEFAULT_USER_AGENT, GetterConfig, MAX_REDIRECTS, POOL_IDLE_TIMEOUT, effective_timeout,
};
use crate::connector::TimeoutConnector;
use crate::error::{
    BoxError, ConnectTimeout, GetError, HeaderTimeout, InvalidUriKind, TimeoutPhase,
};
use crate::header_timeout::{HeaderTimeoutLayer, HeaderTimeoutService};
use crate::response::GetResponse;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::fmt;
use std::time::Duration;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::follow_redirect::policy::Limited;
use tower_http::follow_redirect::{FollowRedirect, FollowRedirectLayer};

type Connector = TimeoutConnector<HttpsConnector<HttpConnector>>;

/// Pooled client, header wait bounded per hop, redirects followed on top
type Transport = FollowRedirect<HeaderTimeoutService<Client<Connector, Empty<Bytes>>>, Limited>;

/// HTTP GET client with one timeout for every request phase.
///
/// The timeout bounds connection setup (DNS, dial and TLS handshake) and,
/// separately, the wait for response headers. The wait starts once the
/// connection is ready, and every redirect hop gets its own. Reading the body
/// is not bounded; callers own that part.
///
/// The transport is built once in [`Getter::new`] and shared by every call and
/// every clone, which is what lets connections be pooled. Build one getter and
/// keep it rather than creating one per request.
///
/// # Example
///
/// ```ignore
/// use http_getter::{FetchError, Getter, HttpGetter};
/// use std::time::Duration;
///
/// let getter = Getter::new(Duration::from_secs(2));
///
/// let len = getter
///     .wrap_get("https://example.com/", |mut resp| async move {
///         let body = resp.body_mut().bytes().await.map_err(anyhow::Error::from)?;
///         Ok::<_, anyhow::Error>(body.len())
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct Getter {
    timeout: Duration,
    transport: Transport,
}

impl Getter {
    /// Create a getter applying `timeout` to dial, TLS handshake and header wait.
    ///
    /// A zero duration selects [`DEFAULT_TIMEOUT`](crate::DEFAULT_TIMEOUT).
    /// GET requests carry no body, so there is no 100-continue wait to bound.
    /// Redirects are followed (up to 10 hops) within the same call.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let timeout = effective_timeout(timeout);

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(timeout));

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_all_versions()
            .wrap_connector(http);

        // pool_timer is required for pool_idle_timeout to take effect
        let mut client_builder = Client::builder(TokioExecutor::new());
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT);
        let client =
            client_builder.build::<_, Empty<Bytes>>(TimeoutConnector::new(https, timeout));

        let transport = ServiceBuilder::new()
            .layer(FollowRedirectLayer::with_policy(Limited::new(MAX_REDIRECTS)))
            .layer(HeaderTimeoutLayer::new(timeout))
            .service(client);

        tracing::debug!(?timeout, "http getter created");

        Self { timeout, transport }
    }

    /// Create a getter from configuration
    #[must_use]
    pub fn from_config(config: &GetterConfig) -> Self {
        Self::new(config.timeout)
    }

    /// The phase timeout in effect
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for Getter {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl fmt::Debug for Getter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Getter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpGetter for Getter {
    async fn get(&self, url: &str) -> Result<GetResponse, GetError> {
        let uri = parse_url(url)?;
        let request = Request::get(uri)
            .header(http::header::USER_AGENT, DEFAULT_USER_AGENT)
            .body(Empty::<Bytes>::new())?;

        tracing::debug!(url, "dispatching GET");

        let response: Response<Incoming> = self
            .transport
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        tracing::debug!(url, status = %response.status(), "GET response headers received");

        Ok(GetResponse::with_drain_timeout(response, self.timeout))
    }
}

/// Parse an absolute http(s) URL.
fn parse_url(url: &str) -> Result<http::Uri, GetError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| GetError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(scheme) => {
            return Err(GetError::InvalidScheme {
                scheme: scheme.to_owned(),
            });
        }
        None => {
            return Err(GetError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            });
        }
    }

    if uri.authority().is_none() {
        return Err(GetError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    Ok(uri)
}

/// Map transport errors to `GetError`, classifying timeouts by phase.
fn map_transport_error(err: BoxError, timeout: Duration) -> GetError {
    if err.is::<HeaderTimeout>() {
        return GetError::Timeout {
            phase: TimeoutPhase::ResponseHeaders,
            after: timeout,
        };
    }

    if is_connect_timeout(&*err) {
        return GetError::Timeout {
            phase: TimeoutPhase::Connect,
            after: timeout,
        };
    }

    GetError::Transport(err)
}

/// Walk the source chain looking for a connect-phase timeout.
fn is_connect_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<ConnectTimeout>() {
            return true;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::TimedOut
        {
            return true;
        }
        current = e.source();
    }
    false
}
