use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Phase timeout used when a getter is constructed with a zero duration
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default User-Agent string for GET requests
pub const DEFAULT_USER_AGENT: &str = concat!("http-getter/", env!("CARGO_PKG_VERSION"));

/// Idle pooled connections are closed after this long
pub(crate) const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Redirect hops followed within a single GET
pub(crate) const MAX_REDIRECTS: usize = 10;

/// Maximum bytes drained from an unread body before it is closed.
///
/// A fully read body lets the connection go back to the pool; beyond this
/// limit the connection is discarded instead.
pub const BODY_DRAIN_LIMIT: usize = 64 * 1024;

/// Getter configuration.
///
/// ```yaml
/// http_getter:
///   timeout: 750ms
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GetterConfig {
    /// Applied to each of dial, TLS handshake and response-header wait.
    /// Zero selects [`DEFAULT_TIMEOUT`].
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
}

impl Default for GetterConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GetterConfig {
    /// Create a configuration with the given phase timeout
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The timeout a getter built from this config will actually apply
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        effective_timeout(self.timeout)
    }
}

pub(crate) fn effective_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_TIMEOUT
    } else {
        timeout
    }
}

/// Humantime mapping for config durations (`"250ms"`, `"3s"`, `"1m 30s"`).
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*d))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GetterConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.effective_timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_zero_timeout_maps_to_default() {
        let config = GetterConfig::new(Duration::ZERO);
        assert_eq!(config.effective_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(
            GetterConfig::new(Duration::from_millis(5)).effective_timeout(),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: GetterConfig = serde_json::from_str(r#"{"timeout": "250ms"}"#).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(250));

        let config: GetterConfig = serde_json::from_str(r#"{"timeout": "1m 30s"}"#).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_deserialize_missing_field_uses_default() {
        let config: GetterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GetterConfig::default());
    }

    #[test]
    fn test_deserialize_rejects_bad_input() {
        assert!(serde_json::from_str::<GetterConfig>(r#"{"timeout": "soon"}"#).is_err());
        assert!(serde_json::from_str::<GetterConfig>(r#"{"timeout": "1s", "proxy": "x"}"#).is_err());
    }

    #[test]
    fn test_serialize_roundtrips_through_humantime() {
        let json = serde_json::to_string(&GetterConfig::new(Duration::from_millis(1500))).unwrap();
        assert_eq!(json, r#"{"timeout":"1s 500ms"}"#);
    }

    #[test]
    fn test_default_user_agent_has_version() {
        assert!(DEFAULT_USER_AGENT.starts_with("http-getter/"));
        assert!(DEFAULT_USER_AGENT.len() > "http-getter/".len());
    }
}
