#![allow(clippy::unwrap_used)]
// Credential precedence, qualifiers and tunables.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Jail;
use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};

use acikit_config::{
    ApicArgs, ApicAuth, ConfigError, CredentialArgs, MysqlArgs, NoPrompt, Prompter, Qualifier, ServerArgs,
    Tunables, command, load_tunables_from, save_tunables, session_config,
};
use acikit_core::api::{Credentials, TlsMode};

// ── Helpers ─────────────────────────────────────────────────────────

/// Answers prompts from a fixed script and records what was asked.
#[derive(Default)]
struct Scripted {
    answers: VecDeque<&'static str>,
    asked: Vec<String>,
}

impl Scripted {
    fn new(answers: &[&'static str]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            asked: Vec::new(),
        }
    }

    fn next(&mut self, prompt: &str) -> String {
        self.asked.push(prompt.to_owned());
        self.answers.pop_front().unwrap().to_owned()
    }
}

impl Prompter for Scripted {
    fn input(&mut self, prompt: &str) -> Result<String, ConfigError> {
        Ok(self.next(prompt))
    }

    fn secret(&mut self, prompt: &str) -> Result<SecretString, ConfigError> {
        Ok(SecretString::from(self.next(prompt)))
    }
}

fn password_of(auth: &ApicAuth) -> &str {
    match auth {
        ApicAuth::Password(p) => p.expose_secret(),
        ApicAuth::Certificate { .. } => panic!("expected password auth"),
    }
}

// ── Precedence ──────────────────────────────────────────────────────

#[test]
fn environment_fills_missing_arguments() {
    Jail::expect_with(|jail| {
        jail.set_env("APIC_URL", "https://10.0.0.1");
        jail.set_env("APIC_LOGIN", "admin");
        jail.set_env("APIC_PASSWORD", "env-secret");

        let apic = ApicArgs::default().resolve(&mut NoPrompt).unwrap();
        assert_eq!(apic.url.as_str(), "https://10.0.0.1/");
        assert_eq!(apic.login, "admin");
        assert_eq!(password_of(&apic.auth), "env-secret");
        Ok(())
    });
}

#[test]
fn arguments_win_over_environment() {
    Jail::expect_with(|jail| {
        jail.set_env("APIC_URL", "https://10.0.0.1");
        jail.set_env("APIC_LOGIN", "env-user");
        jail.set_env("APIC_PASSWORD", "env-secret");

        let args = ApicArgs {
            login: Some("arg-user".into()),
            password: Some("arg-secret".into()),
            ..ApicArgs::default()
        };
        let apic = args.resolve(&mut NoPrompt).unwrap();
        assert_eq!(apic.url.host_str(), Some("10.0.0.1"));
        assert_eq!(apic.login, "arg-user");
        assert_eq!(password_of(&apic.auth), "arg-secret");
        Ok(())
    });
}

#[test]
fn prompts_in_order_for_what_is_missing() {
    Jail::expect_with(|_jail| {
        let mut prompter = Scripted::new(&["admin", "https://apic.example.com", "typed-secret"]);
        let apic = ApicArgs::default().resolve(&mut prompter).unwrap();

        assert_eq!(prompter.asked, vec!["APIC login username", "APIC URL", "APIC Password"]);
        assert_eq!(apic.login, "admin");
        assert_eq!(password_of(&apic.auth), "typed-secret");
        Ok(())
    });
}

#[test]
fn certificate_settings_skip_the_password_prompt() {
    Jail::expect_with(|jail| {
        jail.set_env("APIC_CERT_NAME", "ops-cert");
        jail.set_env("APIC_APPCENTER", "true");

        let args = ApicArgs {
            url: Some("https://10.0.0.1".into()),
            login: Some("ops".into()),
            ..ApicArgs::default()
        };
        let mut prompter = Scripted::new(&["/keys/ops.key"]);
        let apic = args.resolve(&mut prompter).unwrap();

        assert_eq!(prompter.asked, vec!["Private Key"]);
        assert!(apic.appcenter);
        match apic.auth {
            ApicAuth::Certificate { cert_name, key } => {
                assert_eq!(cert_name, "ops-cert");
                assert_eq!(key, PathBuf::from("/keys/ops.key"));
            }
            ApicAuth::Password(_) => panic!("expected certificate auth"),
        }
        Ok(())
    });
}

#[test]
fn missing_value_without_prompting_names_the_field() {
    Jail::expect_with(|jail| {
        jail.set_env("APIC_LOGIN", "admin");
        let err = ApicArgs::default().resolve(&mut NoPrompt).unwrap_err();
        assert!(matches!(&err, ConfigError::MissingCredential { field } if field == "APIC URL"), "got {err:?}");
        Ok(())
    });
}

#[test]
fn non_http_url_is_rejected() {
    Jail::expect_with(|_jail| {
        let args = ApicArgs {
            url: Some("ftp://10.0.0.1".into()),
            login: Some("admin".into()),
            password: Some("pw-secret".into()),
            ..ApicArgs::default()
        };
        let err = args.resolve(&mut NoPrompt).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "url"), "got {err:?}");
        Ok(())
    });
}

#[test]
fn mysql_credentials_come_from_environment() {
    Jail::expect_with(|jail| {
        jail.set_env("APIC_MYSQLIP", "db.example.com");
        jail.set_env("APIC_MYSQLLOGIN", "root");
        jail.set_env("APIC_MYSQLPASSWORD", "db-secret");

        let db = MysqlArgs::default().resolve(&mut NoPrompt).unwrap();
        assert_eq!(db.ip, "db.example.com");
        assert_eq!(db.login, "root");
        assert_eq!(db.password.expose_secret(), "db-secret");
        Ok(())
    });
}

// ── Qualifiers ──────────────────────────────────────────────────────

#[test]
fn qualifiers_select_argument_groups() {
    Jail::expect_with(|_jail| {
        let qualifiers = [Qualifier::Apic, Qualifier::Server];
        let matches = command("tool", "test tool", &qualifiers)
            .try_get_matches_from(["tool", "-u", "https://10.0.0.1", "-l", "admin", "-p", "pw-secret", "--port", "8080"])
            .unwrap();
        let args = CredentialArgs::from_matches(&qualifiers, &matches).unwrap();

        assert_eq!(args.apic.as_ref().unwrap().login.as_deref(), Some("admin"));
        assert!(args.mysql.is_none());
        assert_eq!(
            args.server,
            Some(ServerArgs {
                port: 8080,
                ..ServerArgs::default()
            })
        );

        let resolved = args.resolve(&mut NoPrompt).unwrap();
        assert_eq!(resolved.server.unwrap().ip, "127.0.0.1");
        assert_eq!(resolved.apic.unwrap().login, "admin");
        Ok(())
    });
}

#[test]
fn unknown_flag_for_qualifier_is_an_error() {
    let result = command("tool", "test tool", &[Qualifier::Server]).try_get_matches_from(["tool", "--mysqlip", "x"]);
    assert!(result.is_err());
}

// ── Tunables ────────────────────────────────────────────────────────

#[test]
fn tunables_merge_file_and_environment() {
    Jail::expect_with(|jail| {
        jail.create_file("session.toml", "timeout_secs = 30\npage_size = 500\n")?;
        jail.set_env("ACIKIT_PAGE_SIZE", "250");

        let t = load_tunables_from(Path::new("session.toml")).unwrap();
        assert_eq!(t.timeout_secs, 30);
        assert_eq!(t.page_size, 250);
        assert_eq!(t.subscription_ttl_secs, 60);
        Ok(())
    });
}

#[test]
fn missing_tunables_file_gives_defaults() {
    Jail::expect_with(|_jail| {
        let t = load_tunables_from(Path::new("nope.toml")).unwrap();
        assert_eq!(t, Tunables::default());
        Ok(())
    });
}

#[test]
fn saved_tunables_load_back() {
    Jail::expect_with(|_jail| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.toml");
        let t = Tunables {
            max_retries: 5,
            subscriptions: false,
            ..Tunables::default()
        };
        save_tunables(&t, &path).unwrap();
        assert_eq!(load_tunables_from(&path).unwrap(), t);
        Ok(())
    });
}

// ── Session config ──────────────────────────────────────────────────

#[test]
fn session_config_carries_credentials_and_tunables() {
    Jail::expect_with(|_jail| {
        let apic = ApicArgs {
            url: Some("https://10.0.0.1".into()),
            login: Some("admin".into()),
            password: Some("pw-secret".into()),
            insecure: true,
            ..ApicArgs::default()
        }
        .resolve(&mut NoPrompt)
        .unwrap();
        let tunables = Tunables {
            timeout_secs: 25,
            ca_cert: Some(PathBuf::from("/etc/ca.pem")),
            ..Tunables::default()
        };

        let config = session_config(&apic, &tunables).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(25));
        assert_eq!(config.retry.max_retries, Some(3));
        assert!(matches!(config.verify, TlsMode::DangerAcceptInvalid));
        assert!(!config.appcenter_user);
        match &config.credentials {
            Credentials::Password { username, password } => {
                assert_eq!(username, "admin");
                assert_eq!(password.expose_secret(), "pw-secret");
            }
            Credentials::Certificate { .. } => panic!("expected password credentials"),
        }
        Ok(())
    });
}

#[test]
fn unreadable_key_file_fails_session_config() {
    Jail::expect_with(|_jail| {
        let apic = ApicArgs {
            url: Some("https://10.0.0.1".into()),
            login: Some("ops".into()),
            cert_name: Some("ops-cert".into()),
            key: Some(PathBuf::from("/definitely/missing.key")),
            ..ApicArgs::default()
        }
        .resolve(&mut NoPrompt)
        .unwrap();
        let err = session_config(&apic, &Tunables::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Api(_)), "got {err:?}");
        Ok(())
    });
}
