#![allow(clippy::unwrap_used)]
// Building object trees and checking what they emit.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use acikit_core::interface::parse_name;
use acikit_core::wire::{IngestOptions, emit, ingest};
use acikit_core::{
    AclTuple, BindingMode, CoreError, Encap, EpgId, Match, MoGraph, PhysicalInterface, PortRange, RelationKind,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn children(item: &Value, class: &str) -> Vec<Value> {
    item[class]["children"]
        .as_array()
        .map(|c| c.to_vec())
        .unwrap_or_default()
}

fn count_class(value: &Value, class: &str) -> usize {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| usize::from(k == class) + count_class(v, class))
            .sum(),
        Value::Array(items) => items.iter().map(|v| count_class(v, class)).sum(),
        _ => 0,
    }
}

// ── Emission ────────────────────────────────────────────────────────

#[test]
fn static_path_binding_emits_exact_tree() {
    let mut g = MoGraph::new();
    let tenant = g.tenant("cisco").unwrap();
    let app = g.app_profile(tenant, "ordersystem").unwrap();
    let web = g.epg(app, "web").unwrap();
    let port = PhysicalInterface::parse("eth 1/1/1/1").unwrap();
    g.attach_path(web, &port, Encap::Vlan(5), BindingMode::Regular).unwrap();

    let expected = json!({"fvTenant": {"attributes": {"name": "cisco"}, "children": [
        {"fvAp": {"attributes": {"name": "ordersystem"}, "children": [
            {"fvAEPg": {"attributes": {"name": "web"}, "children": [
                {"fvRsPathAtt": {"attributes": {
                    "tDn": "topology/pod-1/paths-1/pathep-[eth1/1]",
                    "encap": "vlan-5"
                }}}
            ]}}
        ]}}
    ]}});
    assert_eq!(emit(&g, tenant.into()), expected);
    assert_eq!(g.url(web.into()), "/api/mo/uni/tn-cisco/ap-ordersystem/epg-web.json");
}

#[test]
fn deleted_bridge_domain_cascades_without_child_status() {
    let mut g = MoGraph::new();
    let t1 = g.tenant("t1").unwrap();
    let bd = g.bridge_domain(t1, "bd1").unwrap();
    g.add_subnet(bd, "s1", "10.1.1.1/24").unwrap();
    g.mark_deleted(bd.into());

    let out = emit(&g, t1.into());
    let bd_item = &children(&out, "fvTenant")[0];
    assert_eq!(bd_item["fvBD"]["attributes"]["status"], "deleted");
    let subnet = &children(bd_item, "fvBD")[0];
    assert_eq!(subnet["fvSubnet"]["attributes"]["ip"], "10.1.1.1/24");
    assert!(subnet["fvSubnet"]["attributes"].get("status").is_none());
}

#[test]
fn bridge_domain_relation_is_replaced() {
    let mut g = MoGraph::new();
    let t = g.tenant("t").unwrap();
    let bd_a = g.bridge_domain(t, "bd-a").unwrap();
    let bd_b = g.bridge_domain(t, "bd-b").unwrap();
    let app = g.app_profile(t, "app").unwrap();
    let e = g.epg(app, "e").unwrap();

    g.set_bd(e, bd_a).unwrap();
    g.set_bd(e, bd_b).unwrap();
    assert_eq!(g.bd(e), Some(bd_b));

    let out = emit(&g, e.into());
    assert_eq!(count_class(&out, "fvRsBd"), 1);
    assert_eq!(children(&out, "fvAEPg")[0]["fvRsBd"]["attributes"]["tnFvBDName"], "bd-b");
    assert!(!out.to_string().contains("bd-a"));
}

#[test]
fn withdrawn_contract_emits_deleted_reference() {
    let mut g = MoGraph::new();
    let t = g.tenant("t").unwrap();
    let c = g.contract(t, "web").unwrap();
    let app = g.app_profile(t, "app").unwrap();
    let e = g.epg(app, "e").unwrap();
    g.provide(e, c).unwrap();
    assert!(g.dont_provide(e, c));

    let out = emit(&g, e.into());
    let rel = &children(&out, "fvAEPg")[0]["fvRsProv"]["attributes"];
    assert_eq!(rel["tnVzBrCPName"], "web");
    assert_eq!(rel["status"], "deleted");
}

// ── Ingestion ───────────────────────────────────────────────────────

#[test]
fn emitted_tenant_ingests_to_an_equal_tree() {
    let mut g = MoGraph::new();
    let t = g.tenant("shop").unwrap();
    let vrf = g.context(t, "vrf").unwrap();
    let bd = g.bridge_domain(t, "bd").unwrap();
    g.set_context(bd, vrf).unwrap();
    g.add_subnet(bd, "gw", "10.0.0.1/24").unwrap();
    let app = g.app_profile(t, "app").unwrap();
    let web = g.epg(app, "web").unwrap();
    g.set_bd(web, bd).unwrap();
    let flt = g.filter(t, "http").unwrap();
    let acl = AclTuple {
        ethertype: Match::Is("ip".into()),
        protocol: Match::Is("tcp".into()),
        dst: PortRange::single(80),
        ..AclTuple::any()
    };
    g.filter_entry(flt, "http", &acl).unwrap();
    let c = g.contract(t, "web").unwrap();
    let subj = g.contract_subject(c, "s").unwrap();
    g.subject_filter(subj, flt).unwrap();
    g.provide(web, c).unwrap();
    g.add_tag(web.into(), "prod").unwrap();

    let first = emit(&g, t.into());

    let mut copy = MoGraph::new();
    let report = ingest(&mut copy, None, &first, IngestOptions::default()).unwrap();
    assert!(report.unresolved.is_empty());
    let root = report.placed[0];
    assert_eq!(emit(&copy, root), first);

    let web_copy: EpgId = copy.lookup("uni/tn-shop/ap-app/epg-web").unwrap();
    assert_eq!(copy.provided(web_copy).len(), 1);
    assert!(copy.has_tag(web_copy.into(), "prod"));
    assert_eq!(copy.related_objects(web_copy.into(), RelationKind::BridgeDomain).len(), 1);
}

// ── Interface names ─────────────────────────────────────────────────

#[test]
fn interface_names_parse_with_or_without_space() {
    let expected = ("eth".to_owned(), "1".to_owned(), "2".to_owned(), "3".to_owned(), "4".to_owned());
    assert_eq!(parse_name("eth 1/2/3/4").unwrap(), expected);
    assert_eq!(parse_name("eth1/2/3/4").unwrap(), expected);

    for bad in ["eth1/2/3", "1/2/3/4", "eth 1/2/x/4", "", "eth1/2/3/4/5"] {
        assert!(
            matches!(parse_name(bad), Err(CoreError::InvalidArgument { .. })),
            "{bad:?} should be rejected"
        );
    }
}
