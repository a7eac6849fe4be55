// ── Deep query ──
//
// Materialises a whole subtree with a single controller read: one
// `query-target=subtree` request listing every class that can occur
// under the root (objects, reference wrappers and tags), then a flat
// placement pass over the result.

use std::collections::BTreeSet;

use acikit_api::{ApicClient, Query, QueryTarget};
use tracing::{debug, warn};

use crate::dn;
use crate::error::CoreError;
use crate::graph::{MoGraph, MoId, RelationKind};
use crate::registry::{MoClass, class_of_dn};
use crate::wire::{self, IngestOptions, TAG_CLASS};

#[derive(Debug, Clone, Copy, Default)]
pub struct DeepOptions {
    /// Drop controller-maintained attributes so the tree can be pushed back.
    pub config_only: bool,
}

/// A materialised subtree.
#[derive(Debug)]
pub struct DeepTree {
    pub graph: MoGraph,
    pub root: MoId,
    /// DNs of items whose parent was not part of the response.
    pub orphans: Vec<String>,
    /// References whose target is outside the tree.
    pub unresolved: Vec<(MoId, RelationKind, String)>,
}

/// Controller classes a subtree rooted at `root` can contain.
pub fn subtree_classes(root: MoClass) -> Vec<&'static str> {
    let mut classes = vec![root];
    classes.extend(MoClass::descendants(root));
    let relations: BTreeSet<RelationKind> = classes
        .iter()
        .flat_map(|c| c.spec().relations.iter().copied())
        .collect();
    classes
        .iter()
        .map(|c| c.apic_class())
        .chain(relations.iter().map(|r| r.apic_class()))
        .chain(std::iter::once(TAG_CLASS))
        .collect()
}

/// The single URL a deep read of `root_dn` issues.
pub fn deep_url(root_dn: &str) -> Result<String, CoreError> {
    let root = class_of_dn(root_dn)
        .ok_or_else(|| CoreError::invalid_argument(format!("unrecognised DN `{root_dn}`")))?;
    Ok(Query::mo(root_dn)
        .query_target(QueryTarget::Subtree)
        .target_subtree_class(subtree_classes(root))
        .to_url())
}

/// Fetch the subtree under `root_dn` into a fresh graph.
///
/// Any read failure aborts the whole assembly.
pub async fn get_deep(
    client: &impl ApicClient,
    root_dn: &str,
    options: DeepOptions,
) -> Result<DeepTree, CoreError> {
    let url = deep_url(root_dn)?;
    let response = client.get(&url).await?;
    debug!(root = root_dn, items = response.imdata.len(), "deep query answered");

    let mut graph = MoGraph::new();
    let report = wire::ingest_flat(
        &mut graph,
        &response.imdata,
        IngestOptions {
            config_only: options.config_only,
        },
    )?;

    let Some(root) = graph.find_by_dn(root_dn).filter(|id| !graph.node(*id).is_stub()) else {
        return Err(not_found(root_dn));
    };
    for orphan in &report.orphans {
        warn!(root = root_dn, dn = %orphan, "item without a parent in the response");
    }
    for (source, kind, target) in &report.unresolved {
        warn!(source = %graph.dn(*source), %kind, target = %target, "reference left unresolved");
    }
    if report.skipped > 0 {
        debug!(root = root_dn, skipped = report.skipped, "unmodelled classes skipped");
    }

    Ok(DeepTree {
        graph,
        root,
        orphans: report.orphans,
        unresolved: report.unresolved,
    })
}

/// [`get_deep`] for the tenant called `name`.
pub async fn get_deep_tenant(
    client: &impl ApicClient,
    name: &str,
    options: DeepOptions,
) -> Result<DeepTree, CoreError> {
    dn::validate_name(name)?;
    get_deep(client, &format!("uni/tn-{name}"), options).await
}

fn not_found(root_dn: &str) -> CoreError {
    let class = class_of_dn(root_dn).map_or_else(|| "object".to_owned(), |c| c.apic_class().to_owned());
    CoreError::NotFound {
        class,
        name: dn::last_rn(root_dn).to_owned(),
    }
}
