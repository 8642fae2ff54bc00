// ── Runtime session configuration ──
//
// These types describe *how* to reach the server: REST base URL, router
// URL, credentials, and transport tuning. They never touch disk; the
// binary resolves a `SessionConfig` and hands it in.

use std::time::Duration;

use mbs_api::event_loop::DEFAULT_DRAIN_TIMEOUT;
use mbs_api::{TransportConfig, WampConfig};
use secrecy::SecretString;
use url::Url;

/// Default REST API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:6006";

/// Default WAMP router URL.
pub const DEFAULT_WAMP_URL: &str = "ws://localhost:8080/ws";

/// Login credentials. Consumed by the login exchange.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Everything needed to bootstrap one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REST API base URL; request paths are joined onto it.
    pub api_url: Url,
    /// WAMP router URL (`ws://` or `wss://`).
    pub wamp_url: Url,
    pub credentials: Credentials,
    /// HTTP timeout and retry policy.
    pub transport: TransportConfig,
    /// Realm and pub/sub timeouts.
    pub wamp: WampConfig,
    /// Upper bound on the event-loop drain after the action.
    pub drain_timeout: Duration,
}

impl SessionConfig {
    /// A config with default URLs and tuning for the given credentials.
    pub fn new(
        username: impl Into<String>,
        password: SecretString,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            api_url: Url::parse(DEFAULT_API_URL)?,
            wamp_url: Url::parse(DEFAULT_WAMP_URL)?,
            credentials: Credentials {
                username: username.into(),
                password,
            },
            transport: TransportConfig::default(),
            wamp: WampConfig::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_server() {
        let config = SessionConfig::new("admin", SecretString::from("pw")).unwrap();
        assert_eq!(config.api_url.as_str(), "http://localhost:6006/");
        assert_eq!(config.wamp_url.as_str(), "ws://localhost:8080/ws");
        assert_eq!(config.wamp.realm, "realm1");
        assert_eq!(config.transport.retry.max_retries, 5);
        assert_eq!(config.drain_timeout, Duration::from_secs(5));
    }
}
