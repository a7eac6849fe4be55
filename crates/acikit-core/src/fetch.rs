// ── Class-level fetch ──
//
// Reads every object of one class, optionally scoped to a subtree, and
// places each by DN. Ancestors the query did not return become stubs.

use acikit_api::{ApicClient, Query, QueryTarget};
use tracing::debug;

use crate::error::CoreError;
use crate::graph::{Lifecycle, MoGraph, MoId};
use crate::registry::MoClass;
use crate::wire::{DERIVED_ATTRIBUTES, Item};

/// URL for a class read: the whole fabric, or the subtree under `scope`.
pub fn class_url(class: MoClass, scope: Option<&str>) -> String {
    match scope {
        Some(dn) => Query::mo(dn)
            .query_target(QueryTarget::Subtree)
            .target_subtree_class([class.apic_class()])
            .to_url(),
        None => Query::class(class.apic_class()).to_url(),
    }
}

/// Fetch every `class` object (under `scope` when given) into `graph`.
///
/// Returns the placed objects in controller order. Items of other
/// classes in the response are ignored.
pub async fn fetch_class(
    client: &impl ApicClient,
    graph: &mut MoGraph,
    class: MoClass,
    scope: Option<&str>,
) -> Result<Vec<MoId>, CoreError> {
    let url = class_url(class, scope);
    let response = client.get(&url).await?;
    debug!(url = %url, count = response.imdata.len(), "class fetch");

    let mut placed = Vec::with_capacity(response.imdata.len());
    for value in &response.imdata {
        let Some(item) = Item::parse(value) else {
            return Err(CoreError::invalid_structure(format!("malformed item: {value}")));
        };
        if item.class != class.apic_class() {
            continue;
        }
        let Some(dn) = item.attr("dn") else {
            return Err(CoreError::invalid_structure(format!(
                "{} item without a dn",
                item.class
            )));
        };
        let id = graph.place(dn)?;
        for (k, v) in item.attributes() {
            if !DERIVED_ATTRIBUTES.contains(&k) {
                graph.set_attribute_raw(id, k, &v);
            }
        }
        graph.set_lifecycle(id, Lifecycle::Modified);
        placed.push(id);
    }
    Ok(placed)
}
