#![allow(clippy::unwrap_used)]
// Fault reads against the in-memory controller and fault subscriptions
// against a wiremock session.

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use acikit_core::api::{Credentials, Session, SessionConfig};
use acikit_core::{
    FakeController, FaultEvents, FaultFilter, FaultSeverity, fault_subscription_url, fetch_faults,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn inst(dn: &str, severity: &str) -> Value {
    json!({"faultInst": {"attributes": {
        "dn": dn,
        "code": dn.rsplit("fault-").next().unwrap(),
        "severity": severity,
        "domain": "tenant",
        "type": "config",
    }}})
}

fn delegate(dn: &str, affected: &str, severity: &str) -> Value {
    json!({"faultDelegate": {"attributes": {
        "dn": dn,
        "affected": affected,
        "code": "F1298",
        "severity": severity,
        "domain": "tenant",
        "type": "operational",
    }}})
}

fn fabric() -> Vec<Value> {
    vec![
        json!({"fvTenant": {"attributes": {"dn": "uni/tn-t1", "name": "t1"}}}),
        inst("uni/tn-t1/BD-bd1/fault-F0956", "major"),
        inst("uni/tn-t1/ap-app/epg-web/fault-F0467", "minor"),
        inst("uni/tn-t2/ctx-v1/fault-F0321", "critical"),
        delegate("uni/tn-t1/fd-[topology/pod-1/node-101]-fault-F1298", "uni/tn-t1/ap-app/epg-web", "major"),
    ]
}

fn dns(faults: &[acikit_core::Fault]) -> Vec<&str> {
    faults.iter().map(|f| f.dn.as_str()).collect()
}

// ── One-shot reads ──────────────────────────────────────────────────

#[tokio::test]
async fn fabric_read_covers_both_fault_classes() {
    let fake = FakeController::from_items(&fabric()).unwrap();
    let faults = fetch_faults(&fake, &FaultFilter::by_severity([FaultSeverity::Major]), None)
        .await
        .unwrap();

    assert_eq!(fake.query_count(), 2);
    assert_eq!(
        dns(&faults),
        vec![
            "uni/tn-t1/BD-bd1/fault-F0956",
            "uni/tn-t1/fd-[topology/pod-1/node-101]-fault-F1298",
        ]
    );
    assert_eq!(faults[1].affected_dn(), "uni/tn-t1/ap-app/epg-web");
}

#[tokio::test]
async fn scoped_read_stays_inside_the_subtree() {
    let fake = FakeController::from_items(&fabric()).unwrap();
    let filter = FaultFilter::by_severity([FaultSeverity::Minor, FaultSeverity::Critical]);
    let faults = fetch_faults(&fake, &filter, Some("uni/tn-t1")).await.unwrap();

    assert_eq!(fake.query_count(), 1);
    assert_eq!(dns(&faults), vec!["uni/tn-t1/ap-app/epg-web/fault-F0467"]);
}

// ── Subscriptions ───────────────────────────────────────────────────

#[tokio::test]
async fn subscribed_faults_are_drained_per_tenant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/aaaLogin.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "imdata": [{ "aaaLogin": { "attributes": { "token": "tok", "refreshTimeoutSeconds": "600" } } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/class/faultInfo.json"))
        .and(query_param("subscription", "yes"))
        .and(query_param("query-target-filter", r#"eq(faultInfo.severity,"major")"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "subscriptionId": "3003",
            "imdata": [
                inst("uni/tn-t1/BD-bd1/fault-F0956", "major"),
                inst("uni/tn-t2/BD-bd9/fault-F0956", "major"),
                delegate("uni/tn-t1/fd-[x]-fault-F1298", "uni/tn-t1/ap-app/epg-web", "major"),
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // No socket listener: subscribing proceeds after the connect timeout
    // and the snapshot is all this test reads.
    let config = SessionConfig::new(
        Url::parse(&server.uri()).unwrap(),
        Credentials::Password {
            username: "admin".into(),
            password: SecretString::from("pw".to_owned()),
        },
    )
    .with_timeout(Duration::from_millis(500));
    let session = Session::new(config).unwrap();
    session.login().await.unwrap();

    let major = FaultFilter::by_severity([FaultSeverity::Major]);
    assert_eq!(
        fault_subscription_url(&major),
        r#"/api/class/faultInfo.json?query-target-filter=eq(faultInfo.severity,"major")"#
    );
    assert!(!session.has_faults(&major));

    session.subscribe_faults(&major, false).await.unwrap();
    assert!(session.has_faults(&major));
    assert!(!session.has_faults(&FaultFilter::default()));

    let t1 = session.get_faults(&major, Some("t1")).unwrap();
    assert_eq!(
        dns(&t1),
        vec!["uni/tn-t1/BD-bd1/fault-F0956", "uni/tn-t1/fd-[x]-fault-F1298"]
    );
    // Draining consumed the other tenant's fault too.
    assert!(!session.has_faults(&major));
    assert!(session.get_faults(&major, None).unwrap().is_empty());

    session.close().await;
}
