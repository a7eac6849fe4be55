//! Configuration shared by acikit tools.
//!
//! Credential resolution (argument, then `APIC_*` environment, then prompt),
//! session tunables from a TOML file, and translation into
//! `acikit_core::SessionConfig`. Also owns logging setup so every tool
//! filters the same way.

pub mod credentials;
pub mod tunables;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use acikit_core::SessionConfig;
use acikit_core::api::TlsMode;

pub use credentials::{
    ApicArgs, ApicAuth, ApicCredentials, CredentialArgs, MysqlArgs, MysqlCredentials, NoPrompt, Prompter,
    Qualifier, ResolvedCredentials, ServerArgs, TerminalPrompter, command,
};
pub use tunables::{Tunables, load_tunables, load_tunables_from, save_tunables, tunables_path};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no value for '{field}' and prompting is disabled")]
    MissingCredential { field: String },

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Args(#[from] clap::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error(transparent)]
    Api(#[from] acikit_core::api::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Session config ──────────────────────────────────────────────────

/// Combine resolved credentials with tunables into a session config.
pub fn session_config(apic: &ApicCredentials, tunables: &Tunables) -> Result<SessionConfig, ConfigError> {
    let mut config = SessionConfig::new(apic.url.clone(), apic.to_credentials()?);
    config.appcenter_user = apic.appcenter;
    tunables.apply(&mut config);
    if apic.insecure {
        config.verify = TlsMode::DangerAcceptInvalid;
    }
    Ok(config)
}

// ── Logging ─────────────────────────────────────────────────────────

fn verbosity_filter(verbosity: u8) -> EnvFilter {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter))
}

/// Install the fmt subscriber. `RUST_LOG` wins over `verbosity`.
pub fn init_tracing(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(verbosity_filter(verbosity))
        .with_target(false)
        .try_init();
}

/// Same as [`init_tracing`] with one JSON object per line.
pub fn init_json_tracing(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(verbosity_filter(verbosity))
        .try_init();
}
