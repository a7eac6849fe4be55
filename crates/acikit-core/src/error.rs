// ── Core error types ──
//
// Object-model errors plus a translation of session errors that keeps
// the kinds callers branch on (auth, reachability, controller payloads,
// queue signals) distinguishable.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Caller input ─────────────────────────────────────────────────
    /// A value outside the declared set (attribute value, encapsulation,
    /// port range, interface name).
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The operation would break a graph invariant (wrong parent class,
    /// subnet without address, conflicting path binding).
    #[error("Invalid structure: {message}")]
    InvalidStructure { message: String },

    #[error("{class} not found: {name}")]
    NotFound { class: String, name: String },

    // ── Controller / session ─────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthFailure { message: String },

    #[error("Controller unreachable: {message}")]
    Unreachable { message: String },

    #[error("Controller error (HTTP {status}, code {code}): {text}")]
    Controller { status: u16, code: String, text: String },

    #[error("No event queued for {url}")]
    NoEvent { url: String },

    #[error("Session closed")]
    Closed,

    /// Any other session failure (TLS, WebSocket, malformed payload).
    #[error("API error: {message}")]
    Api { message: String },
}

impl CoreError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

// ── Conversion from session errors ───────────────────────────────────

impl From<acikit_api::Error> for CoreError {
    fn from(err: acikit_api::Error) -> Self {
        use acikit_api::Error as Api;
        match err {
            Api::InvalidArgument(message) => Self::InvalidArgument { message },
            Api::AuthFailure { message } => Self::AuthFailure { message },
            Api::Unreachable(e) => Self::Unreachable {
                message: e.to_string(),
            },
            Api::Timeout { timeout_secs } => Self::Unreachable {
                message: format!("request timed out after {timeout_secs}s"),
            },
            Api::Controller { status, code, text } => Self::Controller { status, code, text },
            Api::NoEvent { url } => Self::NoEvent { url },
            Api::Closed => Self::Closed,
            other => Self::Api {
                message: other.to_string(),
            },
        }
    }
}
