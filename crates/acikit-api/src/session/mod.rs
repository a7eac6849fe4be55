// ── Controller session ──
//
// One authenticated conversation with a controller: login, token
// lifecycle, the HTTP request path (retry, pagination, re-auth) and the
// subscription engine. Background work (token refresh, subscription
// refresh, WebSocket reader) runs as tasks owned by the session and is
// torn down by `close()`.

mod config;
mod http;
mod refresh;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{self, AuthToken, Credentials};
use crate::error::Error;
use crate::subscription::SubscriptionEngine;

pub use config::SessionConfig;

// ── SessionState ─────────────────────────────────────────────────────

/// Token lifecycle state, observable through [`Session::watch_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
    /// Token refresh is failing; retries continue with backoff.
    Degraded { attempt: u32 },
    /// The controller rejected the credentials; the session must be closed.
    Failed,
    Closed,
}

/// Token plus the instant it was issued, swapped atomically on refresh.
#[derive(Debug)]
pub(crate) struct LiveToken {
    pub(crate) token: AuthToken,
    pub(crate) issued: Instant,
}

impl LiveToken {
    fn expires_at(&self) -> Instant {
        self.issued + Duration::from_secs(self.token.lifetime_secs)
    }
}

/// Hook run after every successful login, including re-login after the
/// controller rejected the token.
type LoginCallback = Arc<dyn Fn(&Session) + Send + Sync>;

// ── Session ──────────────────────────────────────────────────────────

/// Authenticated controller session.
///
/// Cheaply cloneable via `Arc<SessionInner>`; clones share the token,
/// connection pool and subscription queues.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    http: reqwest::Client,
    base_url: String,
    token: ArcSwapOption<LiveToken>,
    /// Certificate DN for signed requests.
    cert_dn: Option<String>,
    permits: Semaphore,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    closed: AtomicBool,
    /// Serialises re-authentication so concurrent 403s log in once.
    auth_lock: Mutex<()>,
    subscriptions: SubscriptionEngine,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    login_callbacks: std::sync::Mutex<Vec<LoginCallback>>,
}

impl Session {
    /// Create a session. Does NOT contact the controller -- call
    /// [`login()`](Self::login).
    pub fn new(config: SessionConfig) -> Result<Self, Error> {
        let http = config.transport().build_client()?;
        let base_url = config.url.as_str().trim_end_matches('/').to_owned();
        let cert_dn = match &config.credentials {
            Credentials::Certificate {
                username,
                cert_name,
                ..
            } => Some(auth::certificate_dn(
                username,
                cert_name,
                config.appcenter_user,
            )),
            Credentials::Password { .. } => None,
        };
        let (state, _) = watch::channel(SessionState::LoggedOut);
        let cancel = CancellationToken::new();
        let subscriptions = SubscriptionEngine::new(&config, cancel.child_token());

        Ok(Self {
            inner: Arc::new(SessionInner {
                permits: Semaphore::new(config.max_connections_per_host.max(1)),
                http,
                base_url,
                token: ArcSwapOption::empty(),
                cert_dn,
                state,
                cancel,
                closed: AtomicBool::new(false),
                auth_lock: Mutex::new(()),
                subscriptions,
                task_handles: Mutex::new(Vec::new()),
                login_callbacks: std::sync::Mutex::new(Vec::new()),
                config,
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current token lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Observe token lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.inner.state.send_if_modified(|current| {
            if *current == SessionState::Closed || *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    pub(crate) fn subscriptions(&self) -> &SubscriptionEngine {
        &self.inner.subscriptions
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// `true` iff the token is considered live: logged in, or refresh is
    /// degraded but the last token has not yet expired.
    pub fn logged_in(&self) -> bool {
        match self.state() {
            SessionState::LoggedIn => true,
            SessionState::Degraded { .. } => self
                .inner
                .token
                .load()
                .as_ref()
                .is_some_and(|t| Instant::now() < t.expires_at()),
            _ => false,
        }
    }

    /// Token lifetime reported by the controller at the last login/refresh.
    pub fn token_lifetime(&self) -> Option<Duration> {
        self.inner
            .token
            .load()
            .as_ref()
            .map(|t| Duration::from_secs(t.token.lifetime_secs))
    }

    pub(crate) fn current_token(&self) -> Option<Arc<LiveToken>> {
        self.inner.token.load_full()
    }

    fn store_token(&self, token: AuthToken) {
        self.inner.token.store(Some(Arc::new(LiveToken {
            token,
            issued: Instant::now(),
        })));
    }

    // ── Login ────────────────────────────────────────────────────────

    /// Run `callback` after every successful login from now on: the
    /// initial [`login`](Self::login), the re-login that follows a
    /// rejected token and the one the refresh loop falls back to.
    ///
    /// Callbacks run on the task that logged in and must not block.
    pub fn register_login_callback(&self, callback: impl Fn(&Session) + Send + Sync + 'static) {
        self.login_callbacks().push(Arc::new(callback));
    }

    /// Drop every registered login callback.
    pub fn clear_login_callbacks(&self) {
        self.login_callbacks().clear();
    }

    fn login_callbacks(&self) -> std::sync::MutexGuard<'_, Vec<LoginCallback>> {
        self.inner
            .login_callbacks
            .lock()
            .expect("login callback lock poisoned")
    }

    fn run_login_callbacks(&self) {
        let callbacks = self.login_callbacks().clone();
        for callback in callbacks {
            callback(self);
        }
    }

    /// Log in with the default timeout.
    pub async fn login(&self) -> Result<(), Error> {
        self.login_with_timeout(self.inner.config.timeout).await
    }

    /// Send credentials, store the token and its refresh deadline, open
    /// the subscription WebSocket (if enabled) and start the refresh loop.
    pub async fn login_with_timeout(&self, timeout: Duration) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        self.authenticate(timeout).await?;
        self.set_state(SessionState::LoggedIn);

        let mut handles = self.inner.task_handles.lock().await;
        if handles.is_empty() {
            if self.current_token().is_some() {
                let session = self.clone();
                let cancel = self.inner.cancel.child_token();
                handles.push(tokio::spawn(refresh::token_refresh_task(session, cancel)));
            }

            if self.inner.config.subscription_enabled {
                if self.inner.config.signs_every_request() {
                    warn!("subscriptions need a token session; disabled for certificate auth");
                } else {
                    let session = self.clone();
                    let cancel = self.inner.cancel.child_token();
                    handles.push(tokio::spawn(crate::subscription::refresh_task(
                        session, cancel,
                    )));
                    drop(handles);
                    self.inner.subscriptions.ensure_socket(self).await;
                }
            }
        }

        Ok(())
    }

    /// Obtain a token without touching background tasks.
    ///
    /// Used by the initial login and by re-authentication after the
    /// controller rejects the current token.
    pub(crate) async fn authenticate(&self, timeout: Duration) -> Result<(), Error> {
        let guard = self.inner.auth_lock.lock().await;
        let config = &self.inner.config;

        match &config.credentials {
            Credentials::Password { username, .. } => {
                let body = config
                    .credentials
                    .login_body()
                    .ok_or_else(|| Error::InvalidArgument("no login body".into()))?;
                debug!(user = %username, "logging in");
                let (status, text) = self
                    .send_once(reqwest::Method::POST, "/api/aaaLogin.json", Some(&body), timeout)
                    .await?;
                self.accept_token(status, &text)?;
            }
            Credentials::Certificate { cert_name, .. } if config.appcenter_user => {
                let body = auth::app_token_body(cert_name);
                debug!(cert = %cert_name, "requesting app-center token");
                let (status, text) = self
                    .send_signed(
                        reqwest::Method::POST,
                        "/api/requestAppToken.json",
                        Some(&body),
                        timeout,
                    )
                    .await?;
                self.accept_token(status, &text)?;
            }
            Credentials::Certificate { .. } => {
                debug!("certificate session; every request is signed");
            }
        }

        info!(url = %self.inner.base_url, "logged in to controller");
        drop(guard);
        self.run_login_callbacks();
        Ok(())
    }

    fn accept_token(&self, status: u16, text: &str) -> Result<(), Error> {
        if !(200..300).contains(&status) {
            let detail = crate::response::controller_error(status, text);
            return Err(Error::AuthFailure {
                message: format!("login rejected (HTTP {status}): {detail}"),
            });
        }
        let body: serde_json::Value =
            serde_json::from_str(text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text.to_owned(),
            })?;
        self.store_token(AuthToken::from_response(&body)?);
        Ok(())
    }

    /// Refresh the token in place (`GET /api/aaaRefresh.json`).
    pub(crate) async fn refresh_token(&self) -> Result<(), Error> {
        if self.inner.config.appcenter_user {
            return self.authenticate(self.inner.config.timeout).await;
        }
        let (status, text) = self
            .send_once(
                reqwest::Method::GET,
                "/api/aaaRefresh.json",
                None,
                self.inner.config.timeout,
            )
            .await?;
        // Only an explicit rejection sends the refresh loop back to login.
        if !(200..300).contains(&status) && status != 401 && status != 403 {
            return Err(crate::response::controller_error(status, &text));
        }
        self.accept_token(status, &text)
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Cancel background tasks, close the WebSocket and wake every queue
    /// waiter with `Closed`. Safe to call more than once.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.cancel.cancel();
        self.inner.subscriptions.close().await;

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        if let Credentials::Password { username, .. } = &self.inner.config.credentials {
            if self.current_token().is_some() {
                let body = serde_json::json!({ "aaaUser": { "attributes": { "name": username } } });
                if let Err(e) = self
                    .send_once(
                        reqwest::Method::POST,
                        "/api/aaaLogout.json",
                        Some(&body),
                        self.inner.config.timeout,
                    )
                    .await
                {
                    debug!(error = %e, "logout failed (non-fatal)");
                }
            }
        }

        self.inner.token.store(None);
        let _ = self.inner.state.send(SessionState::Closed);
        info!("session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.inner.base_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
