use thiserror::Error;

/// Top-level error type for the `acikit-api` crate.
///
/// Covers authentication, transport, controller-reported failures,
/// WebSocket plumbing and the two queue signals (`NoEvent`, `Closed`).
/// `acikit-core` translates these into its own diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Caller input ────────────────────────────────────────────────
    /// A value outside the accepted set (URL shape, key material, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ── Authentication ──────────────────────────────────────────────
    /// Login or token refresh rejected by the controller.
    #[error("Authentication failed: {message}")]
    AuthFailure { message: String },

    /// Request signing could not be performed with the configured key.
    #[error("Request signing failed: {0}")]
    Signing(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, reset, DNS failure, ...).
    #[error("Controller unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS configuration or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Controller ──────────────────────────────────────────────────
    /// Structured error payload returned by the controller
    /// (`imdata[0].error.attributes.{code,text}`).
    #[error("Controller error (HTTP {status}, code {code}): {text}")]
    Controller { status: u16, code: String, text: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Subscription queues ─────────────────────────────────────────
    /// The queue for a subscription URL is currently empty.
    #[error("No event queued for {url}")]
    NoEvent { url: String },

    /// The session was closed; the queue will never produce again.
    #[error("Session closed")]
    Closed,
}

impl Error {
    /// Returns `true` if this is a transport-level failure worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the controller no longer accepts the session token.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::AuthFailure { .. } => true,
            Self::Controller { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// The controller's error code, if this is a controller-reported failure.
    pub fn controller_code(&self) -> Option<&str> {
        match self {
            Self::Controller { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns `true` for the controller's "result set too big" rejection,
    /// which is answered by retrying the query page by page.
    pub fn is_dataset_too_big(&self) -> bool {
        matches!(
            self,
            Self::Controller { status: 400, text, .. } if text.contains("dataset is too big")
        )
    }
}
