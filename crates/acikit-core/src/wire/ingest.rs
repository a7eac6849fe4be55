// ── JSON ingestion ──
//
// Two entry points: `ingest` walks one hierarchical item (children
// nested under `children`), `ingest_flat` places a flat list of items by
// DN, deferring any whose parent has not been materialised yet.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::{DERIVED_ATTRIBUTES, RUNTIME_ATTRIBUTES, TAG_CLASS};
use crate::dn;
use crate::error::CoreError;
use crate::graph::{Lifecycle, MoGraph, MoId, RelationKind, RelationTarget};
use crate::registry::{MoClass, RnKey};

/// Reference attributes kept on a path binding.
const PATH_ATTRIBUTES: &[&str] = &["encap", "mode", "instrImedcy"];

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Drop attributes the controller maintains itself.
    pub config_only: bool,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    /// Objects placed from top-level items, in input order.
    pub placed: Vec<MoId>,
    /// DNs of items whose parent never appeared.
    pub orphans: Vec<String>,
    /// Relations whose target DN is not in the graph.
    pub unresolved: Vec<(MoId, RelationKind, String)>,
    /// Items of classes the registry does not know.
    pub skipped: usize,
}

/// One `{className: {attributes, children}}` item.
#[derive(Debug, Clone, Copy)]
pub struct Item<'a> {
    pub class: &'a str,
    pub attributes: Option<&'a Map<String, Value>>,
    pub children: &'a [Value],
}

impl<'a> Item<'a> {
    pub fn parse(value: &'a Value) -> Option<Self> {
        let (class, body) = value.as_object()?.iter().next()?;
        Some(Self {
            class,
            attributes: body.get("attributes").and_then(Value::as_object),
            children: body
                .get("children")
                .and_then(Value::as_array)
                .map_or(&[][..], Vec::as_slice),
        })
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.attributes?.get(name)?.as_str()
    }

    /// String view of every attribute; numbers and booleans are rendered.
    pub fn attributes(&self) -> impl Iterator<Item = (&'a str, String)> {
        self.attributes.into_iter().flatten().map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.as_str(), v)
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.attr("status") == Some("deleted")
    }
}

enum Placement {
    Placed(Option<MoId>),
    Deferred,
    Skipped,
}

/// Ingest one hierarchical item under `parent` (or as a root).
pub fn ingest(
    graph: &mut MoGraph,
    parent: Option<MoId>,
    item: &Value,
    options: IngestOptions,
) -> Result<IngestReport, CoreError> {
    let mut report = IngestReport::default();
    if let Some(id) = ingest_item(graph, parent, item, options, &mut report.skipped)? {
        report.placed.push(id);
    }
    report.unresolved = graph.resolve_relations();
    Ok(report)
}

/// Place a flat list of items by DN.
pub fn ingest_flat(
    graph: &mut MoGraph,
    items: &[Value],
    options: IngestOptions,
) -> Result<IngestReport, CoreError> {
    let mut report = IngestReport::default();
    let mut pending: Vec<&Value> = items.iter().collect();

    loop {
        let before = pending.len();
        let mut deferred = Vec::new();
        for item in pending {
            match place_flat(graph, item, options, &mut report.skipped)? {
                Placement::Placed(Some(id)) => report.placed.push(id),
                Placement::Placed(None) => {}
                Placement::Deferred => deferred.push(item),
                Placement::Skipped => report.skipped += 1,
            }
        }
        let stalled = deferred.len() == before;
        pending = deferred;
        if pending.is_empty() || stalled {
            break;
        }
    }

    report.orphans = pending
        .iter()
        .filter_map(|v| Item::parse(v))
        .map(|item| item.attr("dn").unwrap_or(item.class).to_owned())
        .collect();
    report.unresolved = graph.resolve_relations();
    Ok(report)
}

fn place_flat(
    graph: &mut MoGraph,
    value: &Value,
    options: IngestOptions,
    skipped: &mut usize,
) -> Result<Placement, CoreError> {
    let Some(item) = Item::parse(value) else {
        return Err(CoreError::invalid_structure(format!("malformed item: {value}")));
    };
    let Some(item_dn) = item.attr("dn") else {
        return Ok(Placement::Deferred);
    };
    if MoClass::from_apic(item.class).is_none()
        && item.class != TAG_CLASS
        && RelationKind::from_apic(item.class).is_none()
    {
        debug!(class = item.class, dn = item_dn, "skipping unknown class");
        return Ok(Placement::Skipped);
    }

    let parent_dn = match MoClass::from_apic(item.class) {
        Some(class) if class.is_root() => None,
        Some(class) => Some(class.parse_dn(item_dn).map(|(anchor, _)| anchor)),
        None => Some(dn::parent_dn(item_dn)),
    };
    let parent = match parent_dn {
        None => None,
        Some(Some(p)) => match graph.find_by_dn(p) {
            Some(id) => Some(id),
            None => return Ok(Placement::Deferred),
        },
        Some(None) => return Ok(Placement::Deferred),
    };

    ingest_item(graph, parent, value, options, skipped).map(Placement::Placed)
}

fn ingest_item(
    graph: &mut MoGraph,
    parent: Option<MoId>,
    value: &Value,
    options: IngestOptions,
    skipped: &mut usize,
) -> Result<Option<MoId>, CoreError> {
    let Some(item) = Item::parse(value) else {
        return Err(CoreError::invalid_structure(format!("malformed item: {value}")));
    };

    if item.class == TAG_CLASS {
        if let (Some(p), Some(name)) = (parent, tag_name(&item)) {
            graph.tag_raw(p, &name, item.is_deleted());
        }
        return Ok(None);
    }
    if let Some(kind) = RelationKind::from_apic(item.class) {
        if let Some(p) = parent {
            ingest_relation(graph, p, kind, &item)?;
        }
        return Ok(None);
    }
    let Some(class) = MoClass::from_apic(item.class) else {
        debug!(class = item.class, "skipping unknown class");
        *skipped += 1;
        return Ok(None);
    };

    let object_dn = object_dn(graph, parent, class, &item)?;
    let id = graph.place(&object_dn)?;
    for (k, v) in item.attributes() {
        if DERIVED_ATTRIBUTES.contains(&k) || (options.config_only && RUNTIME_ATTRIBUTES.contains(&k)) {
            continue;
        }
        graph.set_attribute_raw(id, k, &v);
    }
    if item.is_deleted() {
        graph.set_lifecycle(id, Lifecycle::Deleted);
    } else {
        graph.set_lifecycle(id, Lifecycle::Modified);
    }

    for child in item.children {
        ingest_item(graph, Some(id), child, options, skipped)?;
    }
    Ok(Some(id))
}

/// DN from the item itself, or synthesised from the parent and key.
fn object_dn(
    graph: &MoGraph,
    parent: Option<MoId>,
    class: MoClass,
    item: &Item<'_>,
) -> Result<String, CoreError> {
    if let Some(dn) = item.attr("dn") {
        return Ok(dn.to_owned());
    }
    let spec = class.spec();
    let rn = match (item.attr("rn"), spec.key) {
        (Some(rn), _) => rn.to_owned(),
        (None, RnKey::Fixed) => class.rn(""),
        (None, RnKey::Name) => class.rn(item.attr("name").unwrap_or_default()),
        (None, RnKey::Attr(attr)) => class.rn(item.attr(attr).unwrap_or_default()),
    };
    let base = match (parent, spec.anchor) {
        (Some(p), Some(anchor)) => graph
            .ancestor_of_class(p, anchor)
            .map(|a| graph.dn(a).to_owned()),
        (Some(p), None) => Some(graph.dn(p).to_owned()),
        (None, _) => spec.root_dn.map(str::to_owned),
    };
    match base {
        Some(base) => Ok(dn::join(&base, &rn)),
        None if class.is_root() => Ok(rn),
        None => Err(CoreError::invalid_structure(format!(
            "cannot place {} `{rn}` without a parent",
            class.apic_class()
        ))),
    }
}

fn tag_name(item: &Item<'_>) -> Option<String> {
    if let Some(name) = item.attr("name") {
        return Some(name.to_owned());
    }
    let dn = item.attr("dn").or_else(|| item.attr("rn"))?;
    dn::last_rn(dn).strip_prefix("tag-").map(str::to_owned)
}

fn ingest_relation(
    graph: &mut MoGraph,
    source: MoId,
    kind: RelationKind,
    item: &Item<'_>,
) -> Result<(), CoreError> {
    let source_class = graph.class(source);
    if !source_class.spec().relations.contains(&kind) {
        debug!(class = item.class, source = %source_class, "relation not modelled on this class");
        return Ok(());
    }

    let attributes: BTreeMap<String, String> = if kind == RelationKind::StaticPath {
        PATH_ATTRIBUTES
            .iter()
            .filter_map(|k| item.attr(k).map(|v| ((*k).to_owned(), v.to_owned())))
            .filter(|(k, v)| !(k == "mode" && v == "regular"))
            .filter(|(k, v)| !(k == "instrImedcy" && v == "lazy"))
            .collect()
    } else {
        BTreeMap::new()
    };

    let name = kind
        .spec()
        .name_attr
        .and_then(|attr| item.attr(attr))
        .filter(|name| !name.is_empty());
    let target_dn = match (item.attr("tDn").filter(|d| !d.is_empty()), name) {
        (Some(dn), _) => {
            graph.attach(source, kind, RelationTarget::Dn(dn.to_owned()), attributes)?;
            dn.to_owned()
        }
        // Name references resolve once the whole batch is placed.
        (None, Some(name)) if graph.dn_for_name(source, kind, name).is_some() => {
            graph.attach_by_name(source, kind, name, attributes)?
        }
        _ => {
            debug!(class = item.class, "reference without a target");
            return Ok(());
        }
    };
    if item.is_deleted() {
        graph.detach(source, kind, &target_dn);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::wire::emit;

    #[test]
    fn hierarchical_round_trip() {
        let doc = json!({ "fvTenant": { "attributes": { "name": "t" }, "children": [
            { "fvCtx": { "attributes": { "name": "vrf", "pcEnfPref": "unenforced" } } },
            { "fvBD": { "attributes": { "name": "bd", "arpFlood": "yes" }, "children": [
                { "fvSubnet": { "attributes": { "ip": "10.0.0.1/24", "scope": "public" } } },
                { "fvRsCtx": { "attributes": { "tnFvCtxName": "vrf" } } }
            ] } },
            { "tagInst": { "attributes": { "name": "prod" } } }
        ] } });

        let mut g = MoGraph::new();
        let report = ingest(&mut g, None, &doc, IngestOptions::default()).unwrap();
        assert!(report.unresolved.is_empty());
        let t = report.placed[0];

        let bd = g.find_by_dn("uni/tn-t/BD-bd").unwrap();
        let ctx = g.find_by_dn("uni/tn-t/ctx-vrf").unwrap();
        assert_eq!(g.related_objects(bd, RelationKind::Context), vec![ctx]);
        assert!(g.find_by_dn("uni/tn-t/BD-bd/subnet-[10.0.0.1/24]").is_some());
        assert_eq!(emit(&g, t), doc);
    }

    #[test]
    fn unknown_classes_are_skipped() {
        let doc = json!({ "fvTenant": { "attributes": { "dn": "uni/tn-t", "name": "t" }, "children": [
            { "fvFutureThing": { "attributes": { "name": "x" } } }
        ] } });
        let mut g = MoGraph::new();
        let report = ingest(&mut g, None, &doc, IngestOptions::default()).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn config_only_strips_runtime_attributes() {
        let doc = json!({ "fvTenant": { "attributes": {
            "dn": "uni/tn-t", "name": "t", "descr": "d", "modTs": "2024-01-01T00:00:00.000+00:00",
            "uid": "15374", "childAction": "", "status": ""
        } } });
        let mut g = MoGraph::new();
        ingest(&mut g, None, &doc, IngestOptions { config_only: true }).unwrap();
        let t = g.find_by_dn("uni/tn-t").unwrap();
        assert_eq!(g.node(t).attributes().len(), 1);
        assert_eq!(g.attribute(t, "descr"), Some("d"));
    }

    #[test]
    fn flat_items_defer_until_parent_exists() {
        let items = vec![
            json!({ "fvAEPg": { "attributes": { "dn": "uni/tn-t/ap-a/epg-e", "name": "e" } } }),
            json!({ "fvRsBd": { "attributes": { "dn": "uni/tn-t/ap-a/epg-e/rsbd", "tnFvBDName": "bd" } } }),
            json!({ "fvAp": { "attributes": { "dn": "uni/tn-t/ap-a", "name": "a" } } }),
            json!({ "fvBD": { "attributes": { "dn": "uni/tn-t/BD-bd", "name": "bd" } } }),
            json!({ "fvTenant": { "attributes": { "dn": "uni/tn-t", "name": "t" } } }),
            json!({ "fvAEPg": { "attributes": { "dn": "uni/tn-x/ap-a/epg-lost", "name": "lost" } } }),
        ];
        let mut g = MoGraph::new();
        let report = ingest_flat(&mut g, &items, IngestOptions::default()).unwrap();

        assert_eq!(report.orphans, vec!["uni/tn-x/ap-a/epg-lost".to_owned()]);
        assert_eq!(g.len(), 4);
        let epg = g.find_by_dn("uni/tn-t/ap-a/epg-e").unwrap();
        let bd = g.find_by_dn("uni/tn-t/BD-bd").unwrap();
        assert_eq!(g.related_objects(epg, RelationKind::BridgeDomain), vec![bd]);
        assert!(report.unresolved.is_empty());
    }

    #[test]
    fn name_reference_binds_the_same_in_any_order() {
        let common_bd = json!({ "fvBD": { "attributes": { "dn": "uni/tn-common/BD-bd", "name": "bd" } } });
        let own_bd = json!({ "fvBD": { "attributes": { "dn": "uni/tn-t/BD-bd", "name": "bd" } } });
        let reference =
            json!({ "fvRsBd": { "attributes": { "dn": "uni/tn-t/ap-a/epg-e/rsbd", "tnFvBDName": "bd" } } });
        let scaffold = [
            json!({ "fvTenant": { "attributes": { "dn": "uni/tn-common", "name": "common" } } }),
            json!({ "fvTenant": { "attributes": { "dn": "uni/tn-t", "name": "t" } } }),
            json!({ "fvAp": { "attributes": { "dn": "uni/tn-t/ap-a", "name": "a" } } }),
            json!({ "fvAEPg": { "attributes": { "dn": "uni/tn-t/ap-a/epg-e", "name": "e" } } }),
            common_bd,
        ];

        for tail in [[reference.clone(), own_bd.clone()], [own_bd.clone(), reference.clone()]] {
            let items: Vec<Value> = scaffold.iter().cloned().chain(tail).collect();
            let mut g = MoGraph::new();
            let report = ingest_flat(&mut g, &items, IngestOptions::default()).unwrap();
            assert!(report.unresolved.is_empty());

            let epg = g.find_by_dn("uni/tn-t/ap-a/epg-e").unwrap();
            let own = g.find_by_dn("uni/tn-t/BD-bd").unwrap();
            assert_eq!(g.related_objects(epg, RelationKind::BridgeDomain), vec![own]);
        }
    }

    #[test]
    fn path_binding_keeps_encap() {
        let doc = json!({ "fvAEPg": { "attributes": { "dn": "uni/tn-t/ap-a/epg-e", "name": "e" }, "children": [
            { "fvRsPathAtt": { "attributes": {
                "tDn": "topology/pod-1/paths-101/pathep-[eth1/1]",
                "encap": "vlan-5", "mode": "regular", "instrImedcy": "lazy"
            } } }
        ] } });
        let mut g = MoGraph::new();
        ingest(&mut g, None, &doc, IngestOptions::default()).unwrap();
        let epg = g.find_by_dn("uni/tn-t/ap-a/epg-e").unwrap();
        let rel = g.related(epg, RelationKind::StaticPath).next().unwrap();
        assert_eq!(rel.attributes.get("encap").map(String::as_str), Some("vlan-5"));
        assert!(!rel.attributes.contains_key("mode"));
    }
}
