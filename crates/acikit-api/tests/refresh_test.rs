#![allow(clippy::unwrap_used)]
// Token refresh loop and login callbacks, against wiremock with a token
// lifetime short enough that the loop wakes every second.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use acikit_api::{Backoff, Credentials, Session, SessionConfig, SessionState};

const LOGIN: &str = "/api/aaaLogin.json";
const REFRESH: &str = "/api/aaaRefresh.json";

// ── Helpers ─────────────────────────────────────────────────────────

/// A four second lifetime puts the refresh loop on a one second period.
fn token_body(token: &str) -> Value {
    json!({
        "imdata": [{ "aaaLogin": { "attributes": { "token": token, "refreshTimeoutSeconds": "4" } } }]
    })
}

fn config(uri: &str) -> SessionConfig {
    let mut config = SessionConfig::new(
        Url::parse(uri).unwrap(),
        Credentials::Password {
            username: "admin".into(),
            password: SecretString::from("secret".to_owned()),
        },
    )
    .with_subscriptions(false)
    .with_timeout(Duration::from_secs(2));
    config.retry = Backoff {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_retries: Some(0),
    };
    config.refresh_backoff = Backoff {
        initial_delay: Duration::from_millis(300),
        max_delay: Duration::from_millis(300),
        max_retries: None,
    };
    config
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1")))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

async fn wait_for_requests(server: &MockServer, route: &str, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(6);
    while requests_to(server, route).await < count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {count} request(s) to {route}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn wait_for_state(session: &Session, wanted: impl Fn(&SessionState) -> bool) -> SessionState {
    let mut rx = session.watch_state();
    let state = tokio::time::timeout(Duration::from_secs(6), rx.wait_for(|s| wanted(s)))
        .await
        .expect("timed out waiting for session state")
        .unwrap();
    *state
}

// ── Token refresh ───────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_runs_at_a_quarter_of_the_lifetime() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path(REFRESH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-2")))
        .mount(&server)
        .await;

    let session = Session::new(config(&server.uri())).unwrap();
    session.login().await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(requests_to(&server, REFRESH).await, 0);

    wait_for_requests(&server, REFRESH, 2).await;
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert_eq!(requests_to(&server, LOGIN).await, 1);

    session.close().await;
}

#[tokio::test]
async fn test_failing_refresh_degrades_then_recovers() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path(REFRESH))
        .respond_with(ResponseTemplate::new(500).set_body_string("busy"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(REFRESH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-2")))
        .mount(&server)
        .await;

    let session = Session::new(config(&server.uri())).unwrap();
    session.login().await.unwrap();

    let degraded = wait_for_state(&session, |s| matches!(s, SessionState::Degraded { .. })).await;
    assert_eq!(degraded, SessionState::Degraded { attempt: 1 });
    // The last token has not expired yet.
    assert!(session.logged_in());

    wait_for_state(&session, |s| *s == SessionState::LoggedIn).await;
    assert_eq!(requests_to(&server, REFRESH).await, 2);
    // A server error is not a credential problem; no second login.
    assert_eq!(requests_to(&server, LOGIN).await, 1);

    session.close().await;
}

#[tokio::test]
async fn test_rejected_refresh_logs_in_again() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path(REFRESH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "imdata": [{ "error": { "attributes": { "code": "403", "text": "Token was invalid" } } }]
        })))
        .mount(&server)
        .await;

    let session = Session::new(config(&server.uri())).unwrap();
    session.login().await.unwrap();

    wait_for_requests(&server, LOGIN, 2).await;
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert!(requests_to(&server, REFRESH).await >= 1);

    session.close().await;
}

#[tokio::test]
async fn test_rejected_refresh_and_login_fail_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1")))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(REFRESH))
        .respond_with(ResponseTemplate::new(403).set_body_string("expired"))
        .mount(&server)
        .await;

    let session = Session::new(config(&server.uri())).unwrap();
    session.login().await.unwrap();

    assert_eq!(wait_for_state(&session, |s| *s == SessionState::Failed).await, SessionState::Failed);
    assert!(!session.logged_in());

    // The loop stopped: no further refresh attempts.
    let refreshes = requests_to(&server, REFRESH).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(requests_to(&server, REFRESH).await, refreshes);
    assert_eq!(requests_to(&server, LOGIN).await, 2);

    session.close().await;
}

// ── Login callbacks ─────────────────────────────────────────────────

#[tokio::test]
async fn test_login_callbacks_fire_on_login_and_relogin() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path(REFRESH))
        .respond_with(ResponseTemplate::new(403).set_body_string("expired"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(REFRESH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-2")))
        .mount(&server)
        .await;

    let session = Session::new(config(&server.uri())).unwrap();
    let logins = Arc::new(AtomicUsize::new(0));
    {
        let logins = Arc::clone(&logins);
        session.register_login_callback(move |s| {
            assert!(s.token_lifetime().is_some());
            logins.fetch_add(1, Ordering::SeqCst);
        });
    }

    session.login().await.unwrap();
    assert_eq!(logins.load(Ordering::SeqCst), 1);

    wait_for_requests(&server, LOGIN, 2).await;
    wait_for_requests(&server, REFRESH, 2).await;
    // Re-login fired the callback; plain refreshes did not.
    assert_eq!(logins.load(Ordering::SeqCst), 2);

    session.close().await;
}

#[tokio::test]
async fn test_cleared_callbacks_do_not_fire() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let session = Session::new(config(&server.uri())).unwrap();
    let logins = Arc::new(AtomicUsize::new(0));
    {
        let logins = Arc::clone(&logins);
        session.register_login_callback(move |_| {
            logins.fetch_add(1, Ordering::SeqCst);
        });
    }
    session.clear_login_callbacks();

    session.login().await.unwrap();
    assert_eq!(logins.load(Ordering::SeqCst), 0);

    session.close().await;
}
