// Credentials, login payloads and certificate request signing.
//
// Password sessions carry the `APIC-cookie` token returned by aaaLogin.
// Certificate sessions sign every request with the user's RSA key: the
// signature covers `METHOD + path + payload` and travels as a set of
// `APIC-*` cookies next to the certificate DN.

use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::rand::SystemRandom;
use ring::signature::{RSA_PKCS1_SHA256, RsaKeyPair};
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::error::Error;

/// How the session proves its identity to the controller.
#[derive(Clone)]
pub enum Credentials {
    /// Name/password login; the token lives in the `APIC-cookie` cookie.
    Password {
        username: String,
        password: SecretString,
    },
    /// X.509 certificate attached to an AAA user; requests are signed
    /// with the matching private key.
    Certificate {
        username: String,
        cert_name: String,
        key: RequestSigner,
    },
}

impl Credentials {
    /// The AAA user name.
    pub fn username(&self) -> &str {
        match self {
            Self::Password { username, .. } | Self::Certificate { username, .. } => username,
        }
    }

    /// Body for `POST /api/aaaLogin.json`.
    pub(crate) fn login_body(&self) -> Option<Value> {
        match self {
            Self::Password { username, password } => Some(json!({
                "aaaUser": {
                    "attributes": {
                        "name": username,
                        "pwd": password.expose_secret(),
                    }
                }
            })),
            Self::Certificate { .. } => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Certificate {
                username,
                cert_name,
                ..
            } => f
                .debug_struct("Certificate")
                .field("username", username)
                .field("cert_name", cert_name)
                .finish_non_exhaustive(),
        }
    }
}

/// Body for `POST /api/requestAppToken.json` (app-center login).
pub(crate) fn app_token_body(cert_name: &str) -> Value {
    json!({ "aaaAppToken": { "attributes": { "appName": cert_name } } })
}

/// Certificate DN as the controller stores it for the user.
pub(crate) fn certificate_dn(username: &str, cert_name: &str, appcenter_user: bool) -> String {
    if appcenter_user {
        format!("uni/userext/appuser-{username}/usercert-{cert_name}")
    } else {
        format!("uni/userext/user-{username}/usercert-{cert_name}")
    }
}

// ── Token ────────────────────────────────────────────────────────────

/// Auth token issued by `aaaLogin` / `aaaRefresh` / `requestAppToken`.
#[derive(Clone)]
pub struct AuthToken {
    pub(crate) token: SecretString,
    /// `refreshTimeoutSeconds` reported alongside the token.
    pub lifetime_secs: u64,
}

impl AuthToken {
    /// Extract the token from a login/refresh response body.
    ///
    /// The payload sits at `imdata[0].<class>.attributes` where the class is
    /// `aaaLogin` for both login and refresh responses.
    pub(crate) fn from_response(body: &Value) -> Result<Self, Error> {
        let attributes = body["imdata"]
            .as_array()
            .and_then(|items| items.first())
            .and_then(|item| item.as_object())
            .and_then(|item| item.values().next())
            .map(|mo| &mo["attributes"])
            .ok_or_else(|| Error::AuthFailure {
                message: "login response carried no token".into(),
            })?;

        let token = attributes["token"]
            .as_str()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::AuthFailure {
                message: "login response carried no token".into(),
            })?;
        let lifetime_secs = attributes["refreshTimeoutSeconds"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| attributes["refreshTimeoutSeconds"].as_u64())
            .unwrap_or(600);

        Ok(Self {
            token: SecretString::from(token.to_owned()),
            lifetime_secs,
        })
    }

    pub(crate) fn expose(&self) -> &str {
        self.token.expose_secret()
    }

    /// `Cookie` header value for token-authenticated requests.
    pub(crate) fn cookie(&self) -> String {
        format!("APIC-cookie={}", self.token.expose_secret())
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("lifetime_secs", &self.lifetime_secs)
            .finish_non_exhaustive()
    }
}

// ── Request signing ──────────────────────────────────────────────────

/// RSA key used to sign requests for certificate-based sessions.
///
/// Cheap to clone; the parsed key pair is shared.
#[derive(Clone)]
pub struct RequestSigner {
    key: std::sync::Arc<RsaKeyPair>,
}

impl RequestSigner {
    /// Load a PEM private key (PKCS#8 or PKCS#1).
    pub fn from_pem_file(path: &Path) -> Result<Self, Error> {
        let der = PrivateKeyDer::from_pem_file(path)
            .map_err(|e| Error::InvalidArgument(format!("cannot read key {}: {e}", path.display())))?;
        Self::from_der(&der)
    }

    /// Parse a PEM private key held in memory.
    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        let der = PrivateKeyDer::from_pem_slice(pem)
            .map_err(|e| Error::InvalidArgument(format!("invalid private key: {e}")))?;
        Self::from_der(&der)
    }

    fn from_der(der: &PrivateKeyDer<'_>) -> Result<Self, Error> {
        let key = match der {
            PrivateKeyDer::Pkcs8(key) => RsaKeyPair::from_pkcs8(key.secret_pkcs8_der()),
            PrivateKeyDer::Pkcs1(key) => RsaKeyPair::from_der(key.secret_pkcs1_der()),
            _ => {
                return Err(Error::InvalidArgument(
                    "private key must be RSA (PKCS#8 or PKCS#1)".into(),
                ));
            }
        }
        .map_err(|e| Error::InvalidArgument(format!("rejected RSA key: {e}")))?;

        Ok(Self {
            key: std::sync::Arc::new(key),
        })
    }

    /// Base64 RSA-SHA256 signature over `method + path + payload`.
    pub fn sign(&self, method: &str, path: &str, payload: &str) -> Result<String, Error> {
        let message = format!("{method}{path}{payload}");
        let mut signature = vec![0; self.key.public().modulus_len()];
        self.key
            .sign(
                &RSA_PKCS1_SHA256,
                &SystemRandom::new(),
                message.as_bytes(),
                &mut signature,
            )
            .map_err(|_| Error::Signing("RSA signing failed".into()))?;
        Ok(STANDARD.encode(signature))
    }

    /// Full `Cookie` header carrying the signature and certificate identity.
    pub(crate) fn cookie(
        &self,
        method: &str,
        path: &str,
        payload: &str,
        cert_dn: &str,
    ) -> Result<String, Error> {
        let signature = self.sign(method, path, payload)?;
        Ok(format!(
            "APIC-Request-Signature={signature}; APIC-Certificate-Algorithm=v1.0; \
             APIC-Certificate-Fingerprint=fingerprint; APIC-Certificate-DN={cert_dn}"
        ))
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner").finish_non_exhaustive()
    }
}
