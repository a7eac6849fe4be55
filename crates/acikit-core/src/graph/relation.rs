// ── Relations ──
//
// Directed, non-owning edges between objects. On the wire each relation
// is a reference child (`fvRsBd`, `fvRsProv`, `fvRsPathAtt`, ...) naming
// its target by name or by DN.

use std::collections::BTreeMap;

use strum::{Display, EnumIter, IntoEnumIterator};

use super::{MoGraph, MoId, PathKey};
use crate::dn;
use crate::error::CoreError;
use crate::registry::MoClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum RelationKind {
    /// EPG -> bridge domain.
    BridgeDomain,
    /// Bridge domain -> context.
    Context,
    /// Bridge domain -> L3 outside.
    BdOutside,
    /// EPG / outside EPG -> provided contract.
    Provide,
    /// EPG / outside EPG -> consumed contract.
    Consume,
    /// EPG -> taboo.
    Protect,
    /// Contract subject -> filter.
    SubjectFilter,
    /// Taboo subject -> filter.
    DenyRule,
    /// L3 outside -> context.
    L3Context,
    /// EPG -> leaf port path, with encapsulation.
    StaticPath,
}

#[derive(Debug)]
pub struct RelationSpec {
    pub apic_class: &'static str,
    /// Class the target must have; `None` for DN-only targets.
    pub target: Option<MoClass>,
    /// Attribute carrying the target name.
    pub name_attr: Option<&'static str>,
    pub rn_prefix: &'static str,
    /// Single-valued relations are replaced on set.
    pub single: bool,
}

impl RelationKind {
    pub fn spec(self) -> &'static RelationSpec {
        match self {
            Self::BridgeDomain => &RelationSpec {
                apic_class: "fvRsBd",
                target: Some(MoClass::BridgeDomain),
                name_attr: Some("tnFvBDName"),
                rn_prefix: "rsbd",
                single: true,
            },
            Self::Context => &RelationSpec {
                apic_class: "fvRsCtx",
                target: Some(MoClass::Context),
                name_attr: Some("tnFvCtxName"),
                rn_prefix: "rsctx",
                single: true,
            },
            Self::BdOutside => &RelationSpec {
                apic_class: "fvRsBDToOut",
                target: Some(MoClass::OutsideL3),
                name_attr: Some("tnL3extOutName"),
                rn_prefix: "rsBDToOut-",
                single: false,
            },
            Self::Provide => &RelationSpec {
                apic_class: "fvRsProv",
                target: Some(MoClass::Contract),
                name_attr: Some("tnVzBrCPName"),
                rn_prefix: "rsprov-",
                single: false,
            },
            Self::Consume => &RelationSpec {
                apic_class: "fvRsCons",
                target: Some(MoClass::Contract),
                name_attr: Some("tnVzBrCPName"),
                rn_prefix: "rscons-",
                single: false,
            },
            Self::Protect => &RelationSpec {
                apic_class: "fvRsProtBy",
                target: Some(MoClass::Taboo),
                name_attr: Some("tnVzTabooName"),
                rn_prefix: "rsprotBy-",
                single: false,
            },
            Self::SubjectFilter => &RelationSpec {
                apic_class: "vzRsSubjFiltAtt",
                target: Some(MoClass::Filter),
                name_attr: Some("tnVzFilterName"),
                rn_prefix: "rssubjFiltAtt-",
                single: false,
            },
            Self::DenyRule => &RelationSpec {
                apic_class: "vzRsDenyRule",
                target: Some(MoClass::Filter),
                name_attr: Some("tnVzFilterName"),
                rn_prefix: "rsdenyRule-",
                single: false,
            },
            Self::L3Context => &RelationSpec {
                apic_class: "l3extRsEctx",
                target: Some(MoClass::Context),
                name_attr: Some("tnFvCtxName"),
                rn_prefix: "rsectx",
                single: true,
            },
            Self::StaticPath => &RelationSpec {
                apic_class: "fvRsPathAtt",
                target: None,
                name_attr: None,
                rn_prefix: "rspathAtt-",
                single: false,
            },
        }
    }

    pub fn apic_class(self) -> &'static str {
        self.spec().apic_class
    }

    pub fn from_apic(apic_class: &str) -> Option<Self> {
        Self::iter().find(|k| k.apic_class() == apic_class)
    }

    /// Relative name of the reference object for a target name or path DN.
    pub fn rn(self, target: &str) -> String {
        let spec = self.spec();
        if spec.single {
            spec.rn_prefix.to_owned()
        } else if self == Self::StaticPath {
            format!("{}[{target}]", spec.rn_prefix)
        } else {
            format!("{}{target}", spec.rn_prefix)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationTarget {
    Object(MoId),
    /// Not (yet) materialised in the graph.
    Dn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationStatus {
    Attached,
    /// Emitted with `status: "deleted"`.
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub kind: RelationKind,
    pub target: RelationTarget,
    pub status: RelationStatus,
    /// Extra reference attributes (`encap`, `mode`, `instrImedcy`).
    pub attributes: BTreeMap<String, String>,
    /// Set for references that name their target (`tnFvBDName`, ...).
    /// [`MoGraph::resolve_relations`] re-picks the DN for these.
    pub target_name: Option<String>,
}

impl Relation {
    pub fn is_attached(&self) -> bool {
        self.status == RelationStatus::Attached
    }
}

impl MoGraph {
    /// Attach a relation from `source`. Single-valued kinds replace the
    /// previous target in place; re-attaching an existing target revives it.
    pub fn attach(
        &mut self,
        source: MoId,
        kind: RelationKind,
        target: RelationTarget,
        attributes: BTreeMap<String, String>,
    ) -> Result<(), CoreError> {
        self.attach_with(source, kind, target, attributes, None)
    }

    /// Attach a reference that names its target. The DN is chosen now by
    /// [`dn_for_name`](Self::dn_for_name) and chosen again whenever
    /// relations are resolved, so the binding does not depend on the
    /// order objects arrive in. Returns the DN chosen now.
    pub fn attach_by_name(
        &mut self,
        source: MoId,
        kind: RelationKind,
        name: &str,
        attributes: BTreeMap<String, String>,
    ) -> Result<String, CoreError> {
        let dn = self
            .dn_for_name(source, kind, name)
            .ok_or_else(|| CoreError::invalid_argument(format!("{kind} references cannot name `{name}`")))?;
        self.attach_with(source, kind, RelationTarget::Dn(dn.clone()), attributes, Some(name.to_owned()))?;
        Ok(dn)
    }

    fn attach_with(
        &mut self,
        source: MoId,
        kind: RelationKind,
        target: RelationTarget,
        attributes: BTreeMap<String, String>,
        target_name: Option<String>,
    ) -> Result<(), CoreError> {
        let source_class = self.class(source);
        if !source_class.spec().relations.contains(&kind) {
            return Err(CoreError::invalid_structure(format!(
                "{source_class} cannot carry a {kind} relation"
            )));
        }
        if let (RelationTarget::Object(t), Some(expected)) = (&target, kind.spec().target) {
            let actual = self.class(*t);
            if actual != expected {
                return Err(CoreError::invalid_argument(format!(
                    "{kind} relation needs a {expected} target, got {actual}"
                )));
            }
        }
        if kind == RelationKind::StaticPath {
            self.check_path_binding(source, &target, &attributes)?;
        }

        let target_dn = self.target_dn(&target);
        let single = kind.spec().single;
        let existing = self.node(source).relations.iter().position(|r| {
            let same_target = match (&r.target_name, &target_name) {
                (Some(a), Some(b)) => a == b,
                _ => self.target_dn(&r.target) == target_dn,
            };
            r.kind == kind && (single || same_target)
        });
        let relation = Relation {
            kind,
            target,
            status: RelationStatus::Attached,
            attributes,
            target_name,
        };
        if kind == RelationKind::StaticPath {
            if let Some(old) = existing.map(|i| &self.node(source).relations[i]) {
                if old.is_attached() {
                    let key = self.path_key(old);
                    self.unindex_path(source, &key);
                }
            }
            let key = self.path_key(&relation);
            self.path_modes
                .entry(key)
                .or_default()
                .insert(source, binding_mode(&relation.attributes).to_owned());
        }
        let relations = &mut self.node_mut(source).relations;
        match existing {
            Some(i) => relations[i] = relation,
            None => relations.push(relation),
        }
        Ok(())
    }

    /// Mark a relation detached. Returns `false` when no such relation exists.
    pub fn detach(&mut self, source: MoId, kind: RelationKind, target_dn: &str) -> bool {
        let position = self
            .node(source)
            .relations
            .iter()
            .position(|r| r.kind == kind && self.target_dn(&r.target) == target_dn);
        match position {
            Some(i) => {
                let relation = &self.node(source).relations[i];
                if kind == RelationKind::StaticPath && relation.is_attached() {
                    let key = self.path_key(relation);
                    self.unindex_path(source, &key);
                }
                self.node_mut(source).relations[i].status = RelationStatus::Detached;
                true
            }
            None => false,
        }
    }

    /// Detach every relation of `kind`.
    pub fn detach_all(&mut self, source: MoId, kind: RelationKind) {
        if kind == RelationKind::StaticPath {
            self.unindex_paths(source);
        }
        for r in &mut self.node_mut(source).relations {
            if r.kind == kind {
                r.status = RelationStatus::Detached;
            }
        }
    }

    /// Attached relations of `kind`.
    pub fn related(&self, source: MoId, kind: RelationKind) -> impl Iterator<Item = &Relation> {
        self.node(source)
            .relations
            .iter()
            .filter(move |r| r.kind == kind && r.is_attached())
    }

    /// Attached targets of `kind` that resolve to objects in this graph.
    pub fn related_objects(&self, source: MoId, kind: RelationKind) -> Vec<MoId> {
        self.related(source, kind)
            .filter_map(|r| self.resolve(&r.target))
            .collect()
    }

    pub fn resolve(&self, target: &RelationTarget) -> Option<MoId> {
        match target {
            RelationTarget::Object(id) => Some(*id),
            RelationTarget::Dn(dn) => self.find_by_dn(dn),
        }
    }

    pub fn target_dn(&self, target: &RelationTarget) -> String {
        match target {
            RelationTarget::Object(id) => self.dn(*id).to_owned(),
            RelationTarget::Dn(dn) => dn.clone(),
        }
    }

    /// Target name as written into the reference's `tn*Name` attribute.
    pub fn target_name(&self, target: &RelationTarget) -> String {
        match target {
            RelationTarget::Object(id) => self.name(*id).to_owned(),
            RelationTarget::Dn(dn) => {
                let rn = dn::last_rn(dn);
                rn.split_once('-').map_or(rn, |(_, name)| name).to_owned()
            }
        }
    }

    /// `true` when the relation must be emitted as a deletion.
    pub fn relation_tombstoned(&self, relation: &Relation) -> bool {
        !relation.is_attached()
            || matches!(relation.target, RelationTarget::Object(t) if self.is_deleted(t))
    }

    /// DN of the object a name-only reference points at: the source's own
    /// tenant when it holds the target, else tenant `common`.
    pub fn dn_for_name(&self, source: MoId, kind: RelationKind, name: &str) -> Option<String> {
        let target = kind.spec().target?;
        let rn = target.rn(name);
        let own = dn::tenant_dn(self.dn(source)).map(|t| dn::join(&t, &rn));
        let common = dn::join("uni/tn-common", &rn);
        match own {
            Some(own) if self.find_by_dn(&own).is_some() => Some(own),
            _ if self.find_by_dn(&common).is_some() => Some(common),
            own => own,
        }
    }

    /// Turn DN targets that now exist into object targets and re-pick the
    /// DN of name references. Returns the relations still unresolved as
    /// `(source, kind, dn)`.
    pub fn resolve_relations(&mut self) -> Vec<(MoId, RelationKind, String)> {
        let mut unresolved = Vec::new();
        let ids: Vec<MoId> = self.ids().collect();
        for id in ids {
            for i in 0..self.node(id).relations.len() {
                let relation = &self.node(id).relations[i];
                // Path bindings point into the inventory tree and are never
                // expected to resolve inside a tenant graph.
                if relation.kind == RelationKind::StaticPath {
                    continue;
                }
                let kind = relation.kind;
                let dn = match (&relation.target_name, &relation.target) {
                    (Some(name), target) => self
                        .dn_for_name(id, kind, name)
                        .unwrap_or_else(|| self.target_dn(target)),
                    (None, RelationTarget::Dn(dn)) => dn.clone(),
                    (None, RelationTarget::Object(_)) => continue,
                };
                if matches!(relation.target, RelationTarget::Object(t) if self.dn(t) == dn) {
                    continue;
                }
                let target = match self.find_by_dn(&dn) {
                    Some(t) => RelationTarget::Object(t),
                    None => {
                        unresolved.push((id, kind, dn.clone()));
                        RelationTarget::Dn(dn)
                    }
                };
                self.node_mut(id).relations[i].target = target;
            }
        }
        unresolved
    }

    /// Relations pointing at removed objects keep the DN instead.
    pub(super) fn demote_targets(&mut self, removed: &[MoId]) {
        let dns: Vec<(MoId, String)> = removed.iter().map(|id| (*id, self.dn(*id).to_owned())).collect();
        for node in &mut self.nodes {
            for r in &mut node.relations {
                if let RelationTarget::Object(t) = r.target {
                    if let Some((_, dn)) = dns.iter().find(|(id, _)| *id == t) {
                        r.target = RelationTarget::Dn(dn.clone());
                    }
                }
            }
        }
    }

    /// Across the graph a path and encap pair must always carry the same
    /// mode.
    fn check_path_binding(
        &self,
        source: MoId,
        target: &RelationTarget,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), CoreError> {
        let key = (self.target_dn(target), attributes.get("encap").cloned());
        let mode = binding_mode(attributes);
        let Some(holders) = self.path_modes.get(&key) else {
            return Ok(());
        };
        match holders.iter().find(|(id, other)| **id != source && other.as_str() != mode) {
            Some((id, other)) => Err(CoreError::invalid_structure(format!(
                "{} encap {} is bound as {other} by {}, cannot bind as {mode}",
                key.0,
                key.1.as_deref().unwrap_or("-"),
                self.dn(*id)
            ))),
            None => Ok(()),
        }
    }

    fn path_key(&self, relation: &Relation) -> PathKey {
        (self.target_dn(&relation.target), relation.attributes.get("encap").cloned())
    }

    fn unindex_path(&mut self, source: MoId, key: &PathKey) {
        if let Some(holders) = self.path_modes.get_mut(key) {
            holders.remove(&source);
            if holders.is_empty() {
                self.path_modes.remove(key);
            }
        }
    }

    /// Forget every attached path binding of `source`.
    pub(super) fn unindex_paths(&mut self, source: MoId) {
        let keys: Vec<PathKey> = self
            .related(source, RelationKind::StaticPath)
            .map(|r| self.path_key(r))
            .collect();
        for key in &keys {
            self.unindex_path(source, key);
        }
    }
}

fn binding_mode(attributes: &BTreeMap<String, String>) -> &str {
    attributes.get("mode").map_or("regular", String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_with_epg() -> (MoGraph, MoId, MoId) {
        let mut g = MoGraph::new();
        let t = g.add_root(MoClass::Tenant, "t").unwrap();
        let ap = g.add_child(t, MoClass::AppProfile, "ap").unwrap();
        let epg = g.add_child(ap, MoClass::Epg, "e").unwrap();
        (g, t, epg)
    }

    #[test]
    fn single_valued_relation_is_replaced() {
        let (mut g, t, epg) = tenant_with_epg();
        let a = g.add_child(t, MoClass::BridgeDomain, "bd-a").unwrap();
        let b = g.add_child(t, MoClass::BridgeDomain, "bd-b").unwrap();
        g.attach(epg, RelationKind::BridgeDomain, RelationTarget::Object(a), BTreeMap::new())
            .unwrap();
        g.attach(epg, RelationKind::BridgeDomain, RelationTarget::Object(b), BTreeMap::new())
            .unwrap();
        assert_eq!(g.node(epg).relations().len(), 1);
        assert_eq!(g.related_objects(epg, RelationKind::BridgeDomain), vec![b]);
    }

    #[test]
    fn target_class_is_checked() {
        let (mut g, t, epg) = tenant_with_epg();
        let ctx = g.add_child(t, MoClass::Context, "vrf").unwrap();
        let err = g
            .attach(epg, RelationKind::BridgeDomain, RelationTarget::Object(ctx), BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        let err = g
            .attach(ctx, RelationKind::Provide, RelationTarget::Dn("uni/tn-t/brc-x".into()), BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidStructure { .. }));
    }

    #[test]
    fn detach_and_deleted_target_tombstone() {
        let (mut g, t, epg) = tenant_with_epg();
        let c1 = g.add_child(t, MoClass::Contract, "c1").unwrap();
        let c2 = g.add_child(t, MoClass::Contract, "c2").unwrap();
        for c in [c1, c2] {
            g.attach(epg, RelationKind::Provide, RelationTarget::Object(c), BTreeMap::new())
                .unwrap();
        }
        assert!(g.detach(epg, RelationKind::Provide, "uni/tn-t/brc-c1"));
        g.mark_deleted(c2);
        let rels = g.node(epg).relations();
        assert!(g.relation_tombstoned(&rels[0]));
        assert!(g.relation_tombstoned(&rels[1]));
        assert!(!g.detach(epg, RelationKind::Provide, "uni/tn-t/brc-none"));
    }

    #[test]
    fn name_references_fall_back_to_common() {
        let mut g = MoGraph::new();
        let common = g.add_root(MoClass::Tenant, "common").unwrap();
        g.add_child(common, MoClass::Contract, "default").unwrap();
        let t = g.add_root(MoClass::Tenant, "t").unwrap();
        let ap = g.add_child(t, MoClass::AppProfile, "ap").unwrap();
        let epg = g.add_child(ap, MoClass::Epg, "e").unwrap();
        assert_eq!(
            g.dn_for_name(epg, RelationKind::Provide, "default").as_deref(),
            Some("uni/tn-common/brc-default")
        );
        assert_eq!(
            g.dn_for_name(epg, RelationKind::Provide, "web").as_deref(),
            Some("uni/tn-t/brc-web")
        );
    }

    #[test]
    fn conflicting_path_modes_are_rejected() {
        let (mut g, _, e1) = tenant_with_epg();
        let ap = g.parent(e1).unwrap();
        let e2 = g.add_child(ap, MoClass::Epg, "e2").unwrap();
        let path = "topology/pod-1/paths-101/pathep-[eth1/1]";
        let attrs = |mode: &str| {
            BTreeMap::from([("encap".to_owned(), "vlan-5".to_owned()), ("mode".to_owned(), mode.to_owned())])
        };
        g.attach(e1, RelationKind::StaticPath, RelationTarget::Dn(path.into()), attrs("regular"))
            .unwrap();
        let err = g
            .attach(e2, RelationKind::StaticPath, RelationTarget::Dn(path.into()), attrs("untagged"))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidStructure { .. }));
        g.attach(e2, RelationKind::StaticPath, RelationTarget::Dn(path.into()), attrs("regular"))
            .unwrap();
    }

    #[test]
    fn name_reference_binding_ignores_arrival_order() {
        let mut g = MoGraph::new();
        let common = g.add_root(MoClass::Tenant, "common").unwrap();
        g.add_child(common, MoClass::Contract, "web").unwrap();
        let t = g.add_root(MoClass::Tenant, "t").unwrap();
        let ap = g.add_child(t, MoClass::AppProfile, "ap").unwrap();
        let epg = g.add_child(ap, MoClass::Epg, "e").unwrap();

        // Only common holds `web` when the reference arrives.
        let first = g.attach_by_name(epg, RelationKind::Provide, "web", BTreeMap::new()).unwrap();
        assert_eq!(first, "uni/tn-common/brc-web");

        let own = g.add_child(t, MoClass::Contract, "web").unwrap();
        assert!(g.resolve_relations().is_empty());
        assert_eq!(g.related_objects(epg, RelationKind::Provide), vec![own]);

        // Re-attaching by name updates the same relation.
        g.attach_by_name(epg, RelationKind::Provide, "web", BTreeMap::new()).unwrap();
        assert_eq!(g.node(epg).relations().len(), 1);

        // Losing the tenant's own contract falls back to common again.
        g.remove_subtree(own);
        g.resolve_relations();
        let rel = g.related(epg, RelationKind::Provide).next().unwrap();
        assert_eq!(g.target_dn(&rel.target), "uni/tn-common/brc-web");
    }

    #[test]
    fn path_mode_record_follows_detach_and_removal() {
        let (mut g, _, e1) = tenant_with_epg();
        let ap = g.parent(e1).unwrap();
        let e2 = g.add_child(ap, MoClass::Epg, "e2").unwrap();
        let path = "topology/pod-1/paths-101/pathep-[eth1/2]";
        let attrs = |encap: &str, mode: &str| {
            BTreeMap::from([("encap".to_owned(), encap.to_owned()), ("mode".to_owned(), mode.to_owned())])
        };
        let bind = |g: &mut MoGraph, epg: MoId, encap: &str, mode: &str| {
            g.attach(epg, RelationKind::StaticPath, RelationTarget::Dn(path.into()), attrs(encap, mode))
        };

        bind(&mut g, e1, "vlan-5", "regular").unwrap();
        assert!(bind(&mut g, e2, "vlan-5", "native").is_err());
        // Another encap on the same path is independent.
        bind(&mut g, e2, "vlan-6", "native").unwrap();

        // Moving e1 to vlan-7 releases vlan-5.
        bind(&mut g, e1, "vlan-7", "regular").unwrap();
        bind(&mut g, e2, "vlan-5", "native").unwrap();

        assert!(bind(&mut g, e1, "vlan-5", "untagged").is_err());
        assert!(g.detach(e2, RelationKind::StaticPath, path));
        bind(&mut g, e1, "vlan-5", "untagged").unwrap();

        let ap2 = g.parent(e1).unwrap();
        let e3 = g.add_child(ap2, MoClass::Epg, "e3").unwrap();
        g.remove_subtree(e1);
        bind(&mut g, e3, "vlan-5", "native").unwrap();
        g.detach_all(e3, RelationKind::StaticPath);
        bind(&mut g, e2, "vlan-5", "regular").unwrap();
    }

    #[test]
    fn relative_names() {
        assert_eq!(RelationKind::BridgeDomain.rn("x"), "rsbd");
        assert_eq!(RelationKind::Provide.rn("web"), "rsprov-web");
        assert_eq!(
            RelationKind::StaticPath.rn("topology/pod-1/paths-1/pathep-[eth1/1]"),
            "rspathAtt-[topology/pod-1/paths-1/pathep-[eth1/1]]"
        );
    }
}
