use serde_json::{Map, Value};

use super::TAG_CLASS;
use crate::graph::{MoGraph, MoId, Relation};
use crate::registry::RnKey;

/// Serialize `id` and its subtree for `push_to_apic`.
///
/// Deleted objects carry `status: "deleted"`; their descendants are
/// emitted without a status since the controller cascades the removal.
/// Detached relations and relations to deleted objects become deletions
/// of the reference object.
pub fn emit(graph: &MoGraph, id: MoId) -> Value {
    emit_node(graph, id, false)
}

fn emit_node(graph: &MoGraph, id: MoId, under_deleted: bool) -> Value {
    let node = graph.node(id);
    let mut attributes = Map::new();
    match node.class().spec().key {
        RnKey::Name => {
            attributes.insert("name".into(), node.name().into());
        }
        RnKey::Attr(_) if node.name() != node.key() => {
            attributes.insert("name".into(), node.name().into());
        }
        RnKey::Attr(_) | RnKey::Fixed => {}
    }
    for (k, v) in node.attributes() {
        attributes.insert(k.clone(), v.clone().into());
    }
    if node.is_deleted() && !under_deleted {
        attributes.insert("status".into(), "deleted".into());
    }

    let cascade = under_deleted || node.is_deleted();
    let mut children: Vec<Value> = node
        .children()
        .iter()
        .map(|c| emit_node(graph, *c, cascade))
        .collect();
    children.extend(node.relations().iter().map(|r| relation_value(graph, r, cascade)));
    children.extend(node.tag_states().map(|(tag, gone)| {
        let mut attrs = Map::new();
        attrs.insert("name".into(), tag.into());
        if gone && !cascade {
            attrs.insert("status".into(), "deleted".into());
        }
        wrap(TAG_CLASS, attrs, Vec::new())
    }));

    wrap(node.class().apic_class(), attributes, children)
}

/// Serialize a single relation as its reference object.
pub fn emit_relation(graph: &MoGraph, relation: &Relation) -> Value {
    relation_value(graph, relation, false)
}

fn relation_value(graph: &MoGraph, relation: &Relation, under_deleted: bool) -> Value {
    let spec = relation.kind.spec();
    let mut attributes = Map::new();
    match spec.name_attr {
        Some(attr) => {
            attributes.insert(attr.into(), graph.target_name(&relation.target).into());
        }
        None => {
            attributes.insert("tDn".into(), graph.target_dn(&relation.target).into());
        }
    }
    for (k, v) in &relation.attributes {
        attributes.insert(k.clone(), v.clone().into());
    }
    if !under_deleted && graph.relation_tombstoned(relation) {
        attributes.insert("status".into(), "deleted".into());
    }
    wrap(spec.apic_class, attributes, Vec::new())
}

fn wrap(class: &str, attributes: Map<String, Value>, children: Vec<Value>) -> Value {
    let mut body = Map::new();
    body.insert("attributes".into(), Value::Object(attributes));
    if !children.is_empty() {
        body.insert("children".into(), Value::Array(children));
    }
    let mut outer = Map::new();
    outer.insert(class.to_owned(), Value::Object(body));
    Value::Object(outer)
}
