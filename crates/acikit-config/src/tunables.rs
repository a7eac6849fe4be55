//! Session tunables: timeouts, retries, paging and subscription timing.
//!
//! Read from `session.toml` in the platform config directory, overridden by
//! `ACIKIT_*` environment variables. Never holds credentials.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use acikit_core::SessionConfig;
use acikit_core::api::TlsMode;

use crate::ConfigError;

pub const ENV_PREFIX: &str = "ACIKIT_";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Tunables {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Transport retries for idempotent reads.
    pub max_retries: u32,
    pub max_connections_per_host: usize,
    /// Page size for queries the controller refuses unpaged.
    pub page_size: usize,
    pub subscription_ttl_secs: u64,
    /// Refresh subscriptions this long before they expire.
    pub subscription_safety_margin_secs: u64,
    pub keepalive_secs: u64,
    /// Events buffered per subscription.
    pub queue_capacity: usize,
    pub subscriptions: bool,
    /// PEM CA bundle for controllers with a private certificate authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            max_connections_per_host: 8,
            page_size: 10_000,
            subscription_ttl_secs: 60,
            subscription_safety_margin_secs: 15,
            keepalive_secs: 30,
            queue_capacity: 65_536,
            subscriptions: true,
            ca_cert: None,
        }
    }
}

impl Tunables {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| ConfigError::Validation {
            field: field.into(),
            reason: reason.into(),
        };
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "must be positive"));
        }
        if self.page_size == 0 {
            return Err(invalid("page_size", "must be positive"));
        }
        if self.max_connections_per_host == 0 {
            return Err(invalid("max_connections_per_host", "must be positive"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be positive"));
        }
        if self.subscription_safety_margin_secs >= self.subscription_ttl_secs {
            return Err(invalid(
                "subscription_safety_margin_secs",
                "must be shorter than subscription_ttl_secs",
            ));
        }
        Ok(())
    }

    /// Copy these values onto `config`.
    pub fn apply(&self, config: &mut SessionConfig) {
        config.timeout = Duration::from_secs(self.timeout_secs);
        config.retry.max_retries = Some(self.max_retries);
        config.max_connections_per_host = self.max_connections_per_host;
        config.page_size = self.page_size;
        config.subscription_ttl = Duration::from_secs(self.subscription_ttl_secs);
        config.subscription_safety_margin = Duration::from_secs(self.subscription_safety_margin_secs);
        config.keepalive_interval = Duration::from_secs(self.keepalive_secs);
        config.queue_capacity = self.queue_capacity;
        config.subscription_enabled = self.subscriptions;
        if let Some(ca) = &self.ca_cert {
            config.verify = TlsMode::CustomCa(ca.clone());
        }
    }
}

/// `session.toml` in the platform config directory.
pub fn tunables_path() -> PathBuf {
    ProjectDirs::from("io", "acikit", "acikit").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("session.toml");
            p
        },
        |dirs| dirs.config_dir().join("session.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), |h| PathBuf::from(h).join(".config/acikit"))
}

/// Load from [`tunables_path`]. A missing file yields the defaults.
pub fn load_tunables() -> Result<Tunables, ConfigError> {
    load_tunables_from(&tunables_path())
}

pub fn load_tunables_from(path: &Path) -> Result<Tunables, ConfigError> {
    let tunables: Tunables = Figment::new()
        .merge(Serialized::defaults(Tunables::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()?;
    tunables.validate()?;
    Ok(tunables)
}

pub fn save_tunables(tunables: &Tunables, path: &Path) -> Result<(), ConfigError> {
    tunables.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(tunables)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_must_be_shorter_than_ttl() {
        let t = Tunables {
            subscription_ttl_secs: 30,
            subscription_safety_margin_secs: 30,
            ..Tunables::default()
        };
        assert!(matches!(t.validate(), Err(ConfigError::Validation { field, .. }) if field == "subscription_safety_margin_secs"));
        assert!(Tunables::default().validate().is_ok());
    }
}
