//! Controller, database and server credentials.
//!
//! Every value is looked up in a fixed order: explicit argument, then the
//! `APIC_*` environment variable, then an interactive prompt.

use std::path::PathBuf;

use clap::{ArgMatches, Args, Command, FromArgMatches};
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;

use acikit_core::api::{Credentials, RequestSigner};

use crate::ConfigError;

/// Environment prefix for credential fallbacks (`APIC_URL`, `APIC_LOGIN`, ...).
pub const ENV_PREFIX: &str = "APIC_";

// ── Qualifiers ──────────────────────────────────────────────────────

/// Argument groups a tool can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qualifier {
    /// Controller URL and login.
    Apic,
    /// MySQL address and login.
    Mysql,
    /// Local listen address for tools that serve HTTP.
    Server,
}

// ── Argument groups ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Args, Serialize, Deserialize)]
pub struct ApicArgs {
    /// APIC URL, e.g. https://10.0.0.1
    #[arg(long, short = 'u')]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// APIC login username
    #[arg(long, short = 'l')]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,

    /// APIC login password
    #[arg(long, short = 'p')]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Certificate name attached to the login user
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_name: Option<String>,

    /// PEM private key matching the certificate
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,

    /// The certificate belongs to an app-center application user
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub appcenter: bool,

    /// Skip TLS certificate verification
    #[arg(long, short = 'k')]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Args, Serialize, Deserialize)]
pub struct MysqlArgs {
    /// MySQL IP address
    #[arg(long, short = 'i')]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mysqlip: Option<String>,

    /// MySQL login username
    #[arg(long, short = 'a')]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mysqllogin: Option<String>,

    /// MySQL password
    #[arg(long, short = 's')]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mysqlpassword: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args, Serialize, Deserialize)]
pub struct ServerArgs {
    /// IP address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub ip: String,

    /// Port to listen on
    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Enable test mode
    #[arg(long)]
    #[serde(default)]
    pub test: bool,

    /// Enable debug mode
    #[arg(long)]
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".into(),
            port: 5000,
            test: false,
            debug: false,
        }
    }
}

/// Build a command carrying the argument groups for `qualifiers`.
pub fn command(name: &'static str, about: &'static str, qualifiers: &[Qualifier]) -> Command {
    let mut cmd = Command::new(name).about(about);
    if qualifiers.contains(&Qualifier::Apic) {
        cmd = ApicArgs::augment_args(cmd);
    }
    if qualifiers.contains(&Qualifier::Mysql) {
        cmd = MysqlArgs::augment_args(cmd);
    }
    if qualifiers.contains(&Qualifier::Server) {
        cmd = ServerArgs::augment_args(cmd);
    }
    cmd
}

/// The argument groups a command was built with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialArgs {
    pub apic: Option<ApicArgs>,
    pub mysql: Option<MysqlArgs>,
    pub server: Option<ServerArgs>,
}

impl CredentialArgs {
    /// Read back the groups added by [`command`] with the same qualifiers.
    pub fn from_matches(qualifiers: &[Qualifier], matches: &ArgMatches) -> Result<Self, ConfigError> {
        let mut out = Self::default();
        if qualifiers.contains(&Qualifier::Apic) {
            out.apic = Some(ApicArgs::from_arg_matches(matches)?);
        }
        if qualifiers.contains(&Qualifier::Mysql) {
            out.mysql = Some(MysqlArgs::from_arg_matches(matches)?);
        }
        if qualifiers.contains(&Qualifier::Server) {
            out.server = Some(ServerArgs::from_arg_matches(matches)?);
        }
        Ok(out)
    }

    /// Fill every missing value from the environment, then from `prompter`.
    pub fn resolve(&self, prompter: &mut impl Prompter) -> Result<ResolvedCredentials, ConfigError> {
        Ok(ResolvedCredentials {
            apic: self.apic.as_ref().map(|a| a.resolve(prompter)).transpose()?,
            mysql: self.mysql.as_ref().map(|m| m.resolve(prompter)).transpose()?,
            server: self.server.clone(),
        })
    }
}

#[derive(Debug)]
pub struct ResolvedCredentials {
    pub apic: Option<ApicCredentials>,
    pub mysql: Option<MysqlCredentials>,
    pub server: Option<ServerArgs>,
}

// ── Prompting ───────────────────────────────────────────────────────

/// Source of values that neither arguments nor environment supplied.
pub trait Prompter {
    fn input(&mut self, prompt: &str) -> Result<String, ConfigError>;
    fn secret(&mut self, prompt: &str) -> Result<SecretString, ConfigError>;
}

/// Asks on the terminal: `dialoguer` for plain values, `rpassword` for secrets.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&mut self, prompt: &str) -> Result<String, ConfigError> {
        dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(|e| ConfigError::Prompt(e.to_string()))
    }

    fn secret(&mut self, prompt: &str) -> Result<SecretString, ConfigError> {
        rpassword::prompt_password(format!("{prompt}: "))
            .map(SecretString::from)
            .map_err(|e| ConfigError::Prompt(e.to_string()))
    }
}

/// Never asks: every missing value is an error. For scripts and CI.
#[derive(Debug, Default)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn input(&mut self, prompt: &str) -> Result<String, ConfigError> {
        Err(ConfigError::MissingCredential { field: prompt.to_owned() })
    }

    fn secret(&mut self, prompt: &str) -> Result<SecretString, ConfigError> {
        Err(ConfigError::MissingCredential { field: prompt.to_owned() })
    }
}

// ── Resolution ──────────────────────────────────────────────────────

/// Explicit arguments layered over `APIC_*` environment variables.
fn layered<T: Serialize + DeserializeOwned>(args: &T) -> Result<T, ConfigError> {
    Ok(Figment::new()
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(args))
        .extract()?)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// How the controller login proves itself.
#[derive(Debug)]
pub enum ApicAuth {
    Password(SecretString),
    Certificate { cert_name: String, key: PathBuf },
}

#[derive(Debug)]
pub struct ApicCredentials {
    pub url: Url,
    pub login: String,
    pub auth: ApicAuth,
    pub appcenter: bool,
    pub insecure: bool,
}

impl ApicArgs {
    pub fn resolve(&self, prompter: &mut impl Prompter) -> Result<ApicCredentials, ConfigError> {
        let merged = layered(self)?;

        let login = match non_empty(merged.login) {
            Some(login) => login,
            None => prompter.input("APIC login username")?,
        };
        let raw_url = match non_empty(merged.url) {
            Some(url) => url,
            None => prompter.input("APIC URL")?,
        };
        let url = Url::parse(raw_url.trim()).map_err(|e| ConfigError::Validation {
            field: "url".into(),
            reason: format!("{raw_url}: {e}"),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation {
                field: "url".into(),
                reason: format!("expected http or https, got {}", url.scheme()),
            });
        }

        let cert_name = non_empty(merged.cert_name);
        let key = merged.key.filter(|k| !k.as_os_str().is_empty());
        let auth = match (non_empty(merged.password), cert_name, key) {
            (Some(password), _, _) => ApicAuth::Password(SecretString::from(password)),
            (None, None, None) => ApicAuth::Password(prompter.secret("APIC Password")?),
            (None, cert_name, key) => {
                let cert_name = match cert_name {
                    Some(c) => c,
                    None => prompter.input("Certificate Name")?,
                };
                let key = match key {
                    Some(k) => k,
                    None => PathBuf::from(prompter.input("Private Key")?),
                };
                ApicAuth::Certificate { cert_name, key }
            }
        };

        tracing::debug!(%url, login = %login, "resolved controller credentials");
        Ok(ApicCredentials {
            url,
            login,
            auth,
            appcenter: merged.appcenter,
            insecure: merged.insecure,
        })
    }
}

impl ApicCredentials {
    /// The login as the API crate expects it. Certificate keys are read here.
    pub fn to_credentials(&self) -> Result<Credentials, ConfigError> {
        Ok(match &self.auth {
            ApicAuth::Password(password) => Credentials::Password {
                username: self.login.clone(),
                password: password.clone(),
            },
            ApicAuth::Certificate { cert_name, key } => Credentials::Certificate {
                username: self.login.clone(),
                cert_name: cert_name.clone(),
                key: RequestSigner::from_pem_file(key)?,
            },
        })
    }
}

#[derive(Debug)]
pub struct MysqlCredentials {
    pub ip: String,
    pub login: String,
    pub password: SecretString,
}

impl MysqlArgs {
    pub fn resolve(&self, prompter: &mut impl Prompter) -> Result<MysqlCredentials, ConfigError> {
        let merged = layered(self)?;
        let ip = match non_empty(merged.mysqlip) {
            Some(ip) => ip,
            None => prompter.input("MySQL IP address")?,
        };
        let login = match non_empty(merged.mysqllogin) {
            Some(login) => login,
            None => prompter.input("MySQL login username")?,
        };
        let password = match merged.mysqlpassword {
            Some(p) => SecretString::from(p),
            None => prompter.secret("MySQL Password")?,
        };
        Ok(MysqlCredentials { ip, login, password })
    }
}
