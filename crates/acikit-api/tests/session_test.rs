#![allow(clippy::unwrap_used)]
// Integration tests for `Session` request handling using wiremock.

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use acikit_api::{Backoff, Credentials, Error, Session, SessionConfig, SessionState};

// ── Helpers ─────────────────────────────────────────────────────────

fn password() -> Credentials {
    Credentials::Password {
        username: "admin".into(),
        password: SecretString::from("secret".to_owned()),
    }
}

fn config(uri: &str) -> SessionConfig {
    let mut config = SessionConfig::new(Url::parse(uri).unwrap(), password())
        .with_subscriptions(false)
        .with_timeout(Duration::from_secs(2));
    config.retry = Backoff {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_retries: Some(2),
    };
    config
}

fn login_body(token: &str) -> serde_json::Value {
    json!({
        "totalCount": "1",
        "imdata": [{
            "aaaLogin": { "attributes": { "token": token, "refreshTimeoutSeconds": "600" } }
        }]
    })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/aaaLogin.json"))
        .and(body_partial_json(json!({ "aaaUser": { "attributes": { "name": "admin" } } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body("tok-1")))
        .mount(server)
        .await;
}

fn tenant(name: &str) -> serde_json::Value {
    json!({ "fvTenant": { "attributes": { "dn": format!("uni/tn-{name}"), "name": name } } })
}

async fn setup() -> (MockServer, Session) {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let session = Session::new(config(&server.uri())).unwrap();
    session.login().await.unwrap();
    (server, session)
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_stores_token_and_lifetime() {
    let (_server, session) = setup().await;

    assert_eq!(session.state(), SessionState::LoggedIn);
    assert!(session.logged_in());
    assert_eq!(session.token_lifetime(), Some(Duration::from_secs(600)));
}

#[tokio::test]
async fn test_login_rejected_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/aaaLogin.json"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "totalCount": "1",
            "imdata": [{ "error": { "attributes": { "code": "401", "text": "User credential is incorrect" } } }]
        })))
        .mount(&server)
        .await;

    let session = Session::new(config(&server.uri())).unwrap();
    let err = session.login().await.unwrap_err();

    assert!(matches!(err, Error::AuthFailure { .. }), "got {err:?}");
    assert!(!session.logged_in());
}

#[tokio::test]
async fn test_requests_carry_token_cookie() {
    let (server, session) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/class/fvTenant.json"))
        .and(wiremock::matchers::header("cookie", "APIC-cookie=tok-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "totalCount": "1", "imdata": [tenant("a")] })),
        )
        .mount(&server)
        .await;

    let resp = session.get("/api/class/fvTenant.json").await.unwrap();
    assert_eq!(resp.imdata, vec![tenant("a")]);
}

// ── Pagination ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_follows_total_count_pages() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/class/fvTenant.json"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalCount": "3",
            "imdata": [tenant("a"), tenant("b")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/class/fvTenant.json"))
        .and(query_param("page", "1"))
        .and(query_param("page-size", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalCount": "3",
            "imdata": [tenant("c")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = session.get("/api/class/fvTenant.json").await.unwrap();

    assert_eq!(resp.total_count, 3);
    assert_eq!(resp.imdata, vec![tenant("a"), tenant("b"), tenant("c")]);
}

#[tokio::test]
async fn test_dataset_too_big_falls_back_to_paging() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let mut cfg = config(&server.uri());
    cfg.page_size = 2;
    let session = Session::new(cfg).unwrap();
    session.login().await.unwrap();

    Mock::given(method("GET"))
        .and(path("/api/class/fvCEp.json"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "totalCount": "1",
            "imdata": [{ "error": { "attributes": {
                "code": "400",
                "text": "Unable to process the query, result dataset is too big"
            } } }]
        })))
        .mount(&server)
        .await;
    for (page, names) in [("0", vec!["a", "b"]), ("1", vec!["c"])] {
        Mock::given(method("GET"))
            .and(path("/api/class/fvCEp.json"))
            .and(query_param("page", page))
            .and(query_param("page-size", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalCount": "3",
                "imdata": names.iter().map(|n| tenant(n)).collect::<Vec<_>>()
            })))
            .mount(&server)
            .await;
    }

    let resp = session.get("/api/class/fvCEp.json").await.unwrap();
    assert_eq!(resp.imdata.len(), 3);
}

// ── Errors and retries ──────────────────────────────────────────────

#[tokio::test]
async fn test_unreachable_controller_after_retries() {
    let session = Session::new(config("http://127.0.0.1:1")).unwrap();
    let err = session.get("/api/class/fvTenant.json").await.unwrap_err();
    assert!(matches!(err, Error::Unreachable(_) | Error::Timeout { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_forbidden_triggers_single_relogin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/aaaLogin.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body("tok-1")))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/class/fvTenant.json"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "totalCount": "1",
            "imdata": [{ "error": { "attributes": { "code": "403", "text": "Token was invalid" } } }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/class/fvTenant.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "totalCount": "1", "imdata": [tenant("a")] })),
        )
        .mount(&server)
        .await;

    let session = Session::new(config(&server.uri())).unwrap();
    session.login().await.unwrap();
    let resp = session.get("/api/class/fvTenant.json").await.unwrap();

    assert_eq!(resp.imdata.len(), 1);
    assert_eq!(session.state(), SessionState::LoggedIn);
}

#[tokio::test]
async fn test_push_returns_controller_error() {
    let (server, session) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/mo/uni.json"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "totalCount": "1",
            "imdata": [{ "error": { "attributes": { "code": "103", "text": "Unknown property value foo" } } }]
        })))
        .mount(&server)
        .await;

    let err = session
        .push_to_apic("/api/mo/uni.json", &json!({ "fvTenant": { "attributes": { "name": "x" } } }))
        .await
        .unwrap_err();

    match err {
        Error::Controller { status, code, text } => {
            assert_eq!(status, 400);
            assert_eq!(code, "103");
            assert_eq!(text, "Unknown property value foo");
        }
        other => panic!("expected controller error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_push_success_returns_body() {
    let (server, session) = setup().await;
    let doc = json!({ "fvTenant": { "attributes": { "name": "x" } } });
    Mock::given(method("POST"))
        .and(path("/api/mo/uni.json"))
        .and(body_partial_json(doc.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "totalCount": "0", "imdata": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = session.push_to_apic("/api/mo/uni.json", &doc).await.unwrap();
    assert_eq!(resp.status, 200);
    assert!(resp.is_empty());
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_closed_session_rejects_requests() {
    let (_server, session) = setup().await;
    session.close().await;
    session.close().await;

    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.get("/api/class/fvTenant.json").await, Err(Error::Closed)));
    assert!(matches!(session.get_event("/api/class/fvTenant.json"), Err(Error::Closed)));
}

#[tokio::test]
async fn test_get_event_on_unsubscribed_url_is_no_event() {
    let (_server, session) = setup().await;
    let err = session.get_event("/api/class/fvTenant.json").unwrap_err();
    assert!(matches!(err, Error::NoEvent { .. }));
    assert!(!session.has_events("/api/class/fvTenant.json"));
    assert_eq!(session.get_event_count("/api/class/fvTenant.json"), 0);
}
