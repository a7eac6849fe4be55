use std::time::Duration;

use url::Url;

use crate::auth::Credentials;
use crate::backoff::Backoff;
use crate::transport::{TlsMode, TransportConfig};

/// Plain configuration record for one [`Session`](crate::Session).
///
/// Built directly by library users or resolved by `acikit-config` from
/// arguments, environment and prompts.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Controller base URL, e.g. `https://10.0.0.1`.
    pub url: Url,
    pub credentials: Credentials,
    /// TLS certificate validation.
    pub verify: TlsMode,
    /// Open the subscription WebSocket at login.
    pub subscription_enabled: bool,
    /// Certificate credentials belong to an app-center application user.
    pub appcenter_user: bool,
    /// Default per-request timeout.
    pub timeout: Duration,
    /// Transport retry policy for idempotent reads.
    pub retry: Backoff,
    /// Concurrent request cap against the controller.
    pub max_connections_per_host: usize,
    /// Page size used when the controller refuses an unpaged query.
    pub page_size: usize,
    /// Controller-side subscription lifetime.
    pub subscription_ttl: Duration,
    /// Subscriptions are refreshed this long before they expire.
    pub subscription_safety_margin: Duration,
    /// Interval between WebSocket pings.
    pub keepalive_interval: Duration,
    /// Token refresh failure backoff.
    pub refresh_backoff: Backoff,
    /// WebSocket reconnect backoff.
    pub reconnect: Backoff,
    /// Live events buffered per subscription URL. Overflow replaces the
    /// backlog with a `Reset` marker.
    pub queue_capacity: usize,
    /// Override for the WebSocket endpoint base (proxied controllers).
    pub websocket_base: Option<Url>,
}

impl SessionConfig {
    pub fn new(url: Url, credentials: Credentials) -> Self {
        Self {
            url,
            credentials,
            verify: TlsMode::System,
            subscription_enabled: true,
            appcenter_user: false,
            timeout: Duration::from_secs(10),
            retry: Backoff::request_retry(),
            max_connections_per_host: 8,
            page_size: 10_000,
            subscription_ttl: Duration::from_secs(60),
            subscription_safety_margin: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(30),
            refresh_backoff: Backoff::reconnect(),
            reconnect: Backoff::reconnect(),
            queue_capacity: 65_536,
            websocket_base: None,
        }
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = TlsMode::from_verify(verify);
        self
    }

    pub fn with_subscriptions(mut self, enabled: bool) -> Self {
        self.subscription_enabled = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.verify.clone(),
            timeout: self.timeout,
            max_connections_per_host: self.max_connections_per_host,
        }
    }

    /// Certificate sessions outside app-center sign every request and
    /// never hold a token.
    pub(crate) fn signs_every_request(&self) -> bool {
        matches!(self.credentials, Credentials::Certificate { .. }) && !self.appcenter_user
    }

    /// WebSocket URL for `token`: `wss://host/socket<token>`.
    pub(crate) fn websocket_url(&self, token: &str) -> Result<Url, url::ParseError> {
        let mut base = self.websocket_base.clone().unwrap_or_else(|| self.url.clone());
        let scheme = match base.scheme() {
            "http" | "ws" => "ws",
            _ => "wss",
        };
        // Switching between the special schemes http/https/ws/wss is allowed.
        let _ = base.set_scheme(scheme);
        base.join(&format!("/socket{token}"))
    }
}
