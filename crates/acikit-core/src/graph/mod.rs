// ── Managed-object graph ──
//
// Arena of managed objects for one session or one deep query. Parent
// links and relations are indices into the arena; the DN index keeps
// every DN unique, so two handles with the same DN are the same object.

mod relation;

use std::collections::{BTreeMap, HashMap};

use crate::dn;
use crate::error::CoreError;
use crate::registry::{MoClass, RnKey, class_of_dn};

pub use relation::{Relation, RelationKind, RelationSpec, RelationStatus, RelationTarget};

/// Index of an object in its [`MoGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MoId(usize);

/// What the next emission says about an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Built locally, not yet known to the controller.
    #[default]
    Created,
    /// Read from the controller.
    Modified,
    /// Emitted with `status: "deleted"`.
    Deleted,
}

#[derive(Debug, Clone)]
pub struct MoNode {
    class: MoClass,
    name: String,
    key: String,
    dn: String,
    parent: Option<MoId>,
    children: Vec<MoId>,
    attributes: BTreeMap<String, String>,
    lifecycle: Lifecycle,
    relations: Vec<Relation>,
    /// Tag name -> tombstoned.
    tags: BTreeMap<String, bool>,
    /// Placeholder ancestor created from a DN prefix.
    stub: bool,
    /// Unlinked from the tree; the slot stays so ids remain stable.
    removed: bool,
}

impl MoNode {
    pub fn class(&self) -> MoClass {
        self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value the relative name is built from (name, ip, mac or id).
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn parent(&self) -> Option<MoId> {
        self.parent
    }

    pub fn children(&self) -> &[MoId] {
        &self.children
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle == Lifecycle::Deleted
    }

    pub fn is_stub(&self) -> bool {
        self.stub
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Live tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().filter(|(_, gone)| !**gone).map(|(t, _)| t.as_str())
    }

    /// Every tag including tombstones, sorted, with the tombstone flag.
    pub fn tag_states(&self) -> impl Iterator<Item = (&str, bool)> {
        self.tags.iter().map(|(t, gone)| (t.as_str(), *gone))
    }
}

/// Attributes the graph owns; they cannot be set directly.
const RESERVED: &[&str] = &["dn", "rn", "status", "name"];

#[derive(Debug, Clone, Default)]
pub struct MoGraph {
    nodes: Vec<MoNode>,
    by_dn: HashMap<String, MoId>,
    /// Attached static path bindings: `(path, encap)` to the mode each
    /// binding object uses.
    path_modes: BTreeMap<PathKey, BTreeMap<MoId, String>>,
}

/// Path DN and encapsulation of a static binding.
type PathKey = (String, Option<String>);

impl MoGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| !n.removed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node(&self, id: MoId) -> &MoNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: MoId) -> &mut MoNode {
        &mut self.nodes[id.0]
    }

    /// Live object ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = MoId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.removed)
            .map(|(i, _)| MoId(i))
    }

    /// Live objects without a parent.
    pub fn roots(&self) -> impl Iterator<Item = MoId> + '_ {
        self.ids().filter(|id| self.node(*id).parent.is_none())
    }

    pub fn of_class(&self, class: MoClass) -> impl Iterator<Item = MoId> + '_ {
        self.ids().filter(move |id| self.node(*id).class == class)
    }

    pub fn find_by_dn(&self, dn: &str) -> Option<MoId> {
        self.by_dn.get(dn).copied()
    }

    pub fn dn(&self, id: MoId) -> &str {
        &self.node(id).dn
    }

    /// REST URL of the object: `/api/mo/{dn}.json`.
    pub fn url(&self, id: MoId) -> String {
        format!("/api/mo/{}.json", self.node(id).dn)
    }

    pub fn class(&self, id: MoId) -> MoClass {
        self.node(id).class
    }

    pub fn name(&self, id: MoId) -> &str {
        &self.node(id).name
    }

    pub fn parent(&self, id: MoId) -> Option<MoId> {
        self.node(id).parent
    }

    pub fn children(&self, id: MoId) -> &[MoId] {
        &self.node(id).children
    }

    pub fn children_of_class(&self, id: MoId, class: MoClass) -> impl Iterator<Item = MoId> + '_ {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(move |c| self.node(*c).class == class)
    }

    /// Child of `class` whose relative-name key is `key`.
    pub fn child(&self, id: MoId, class: MoClass, key: &str) -> Option<MoId> {
        self.children_of_class(id, class).find(|c| self.node(*c).key == key)
    }

    /// Nearest ancestor (or self) of `class`.
    pub fn ancestor_of_class(&self, id: MoId, class: MoClass) -> Option<MoId> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if self.node(c).class == class {
                return Some(c);
            }
            cur = self.node(c).parent;
        }
        None
    }

    /// Every live descendant of `id`, depth first, excluding `id`.
    pub fn descendants(&self, id: MoId) -> Vec<MoId> {
        let mut out = Vec::new();
        let mut stack: Vec<MoId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(c) = stack.pop() {
            out.push(c);
            stack.extend(self.node(c).children.iter().rev().copied());
        }
        out
    }

    // ── Construction ─────────────────────────────────────────────────

    /// Create (or return) a root object.
    pub fn add_root(&mut self, class: MoClass, name: &str) -> Result<MoId, CoreError> {
        if !class.is_root() {
            return Err(CoreError::invalid_structure(format!("{class} is not a root class")));
        }
        if class.spec().key != RnKey::Fixed {
            dn::validate_name(name)?;
        }
        self.insert(None, class, name, name, false)
    }

    /// Create (or return) a child keyed by its name.
    pub fn add_child(&mut self, parent: MoId, class: MoClass, name: &str) -> Result<MoId, CoreError> {
        dn::validate_name(name)?;
        self.add_keyed(parent, class, name, name)
    }

    /// Create (or return) a child whose relative name comes from `key`
    /// (an address or id) rather than its name.
    pub fn add_keyed(
        &mut self,
        parent: MoId,
        class: MoClass,
        name: &str,
        key: &str,
    ) -> Result<MoId, CoreError> {
        if key.is_empty() {
            return Err(CoreError::invalid_structure(format!(
                "{class} `{name}` needs a non-empty key"
            )));
        }
        if name != key && class.spec().key != RnKey::Name {
            dn::validate_name(name)?;
        }
        let parent_class = self.node(parent).class;
        if !class.spec().parents.contains(&parent_class) {
            return Err(CoreError::invalid_structure(format!(
                "{class} cannot be a child of {parent_class}"
            )));
        }
        self.insert(Some(parent), class, name, key, false)
    }

    fn insert(
        &mut self,
        parent: Option<MoId>,
        class: MoClass,
        name: &str,
        key: &str,
        stub: bool,
    ) -> Result<MoId, CoreError> {
        let spec = class.spec();
        let base = match (parent, spec.anchor) {
            (Some(p), Some(anchor)) => {
                let a = self.ancestor_of_class(p, anchor).ok_or_else(|| {
                    CoreError::invalid_structure(format!("{class} needs a {anchor} ancestor"))
                })?;
                self.node(a).dn.clone()
            }
            (Some(p), None) => self.node(p).dn.clone(),
            (None, _) => spec.root_dn.unwrap_or_default().to_owned(),
        };
        let dn = dn::join(&base, &class.rn(key));

        if let Some(existing) = self.by_dn.get(&dn).copied() {
            let node = self.node_mut(existing);
            if node.stub && !stub {
                node.stub = false;
                name.clone_into(&mut node.name);
            }
            return Ok(existing);
        }

        let mut attributes = BTreeMap::new();
        if let RnKey::Attr(attr) = spec.key {
            attributes.insert(attr.to_owned(), key.to_owned());
        }
        let id = MoId(self.nodes.len());
        self.nodes.push(MoNode {
            class,
            name: name.to_owned(),
            key: key.to_owned(),
            dn: dn.clone(),
            parent,
            children: Vec::new(),
            attributes,
            lifecycle: if stub { Lifecycle::Modified } else { Lifecycle::Created },
            relations: Vec::new(),
            tags: BTreeMap::new(),
            stub,
            removed: false,
        });
        self.by_dn.insert(dn, id);
        if let Some(p) = parent {
            self.node_mut(p).children.push(id);
        }
        Ok(id)
    }

    /// Find or create the object at `dn`, creating missing ancestors as
    /// stubs. The object itself is not a stub.
    pub fn place(&mut self, dn_str: &str) -> Result<MoId, CoreError> {
        self.place_inner(dn_str, false)
    }

    fn place_inner(&mut self, dn_str: &str, stub: bool) -> Result<MoId, CoreError> {
        if let Some(id) = self.find_by_dn(dn_str) {
            if !stub {
                self.node_mut(id).stub = false;
            }
            return Ok(id);
        }
        let class = class_of_dn(dn_str)
            .ok_or_else(|| CoreError::invalid_structure(format!("unrecognised DN `{dn_str}`")))?;
        let (anchor_dn, key) = class
            .parse_dn(dn_str)
            .ok_or_else(|| CoreError::invalid_structure(format!("unrecognised DN `{dn_str}`")))?;
        let key = key.to_owned();
        let name = if class.spec().key == RnKey::Fixed { "fabric" } else { key.as_str() };

        if class.is_root() {
            return self.insert(None, class, name, &key, stub);
        }
        let anchor = self.place_inner(anchor_dn, true)?;
        let parent = if class == MoClass::Interface {
            self.interface_parent(anchor, &key)
        } else {
            anchor
        };
        self.insert(Some(parent), class, name, &key, stub)
    }

    /// The linecard an interface id (`eth<module>/<port>`) belongs to,
    /// or the node when no such linecard is in the graph.
    pub(crate) fn interface_parent(&self, node: MoId, interface_id: &str) -> MoId {
        let module = interface_id
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .split('/')
            .next()
            .unwrap_or_default();
        self.child(node, MoClass::Linecard, module).unwrap_or(node)
    }

    // ── Attributes ───────────────────────────────────────────────────

    /// Set a declared or free-form attribute, validating declared value sets.
    pub fn set_attribute(&mut self, id: MoId, attr: &str, value: &str) -> Result<(), CoreError> {
        let class = self.node(id).class;
        if RESERVED.contains(&attr) || matches!(class.spec().key, RnKey::Attr(key) if key == attr) {
            return Err(CoreError::invalid_argument(format!(
                "{attr} of {} cannot be changed",
                self.node(id).dn
            )));
        }
        class
            .validate_attribute(attr, value)
            .map_err(CoreError::invalid_argument)?;
        self.node_mut(id).attributes.insert(attr.to_owned(), value.to_owned());
        Ok(())
    }

    /// Store an attribute without validation (JSON ingestion).
    pub(crate) fn set_attribute_raw(&mut self, id: MoId, attr: &str, value: &str) {
        let node = self.node_mut(id);
        if attr == "name" {
            value.clone_into(&mut node.name);
        } else {
            node.attributes.insert(attr.to_owned(), value.to_owned());
        }
    }

    pub fn remove_attribute(&mut self, id: MoId, attr: &str) -> Option<String> {
        self.node_mut(id).attributes.remove(attr)
    }

    pub fn attribute(&self, id: MoId, attr: &str) -> Option<&str> {
        self.node(id).attribute(attr)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Mark the object deleted. Children are left alone; the controller
    /// cascades the removal.
    pub fn mark_deleted(&mut self, id: MoId) {
        self.node_mut(id).lifecycle = Lifecycle::Deleted;
    }

    pub fn is_deleted(&self, id: MoId) -> bool {
        self.node(id).is_deleted()
    }

    pub(crate) fn set_lifecycle(&mut self, id: MoId, lifecycle: Lifecycle) {
        self.node_mut(id).lifecycle = lifecycle;
    }

    /// Unlink `id` and its subtree from the graph. Relations elsewhere
    /// that point at removed objects fall back to DN targets.
    pub fn remove_subtree(&mut self, id: MoId) {
        let mut doomed = self.descendants(id);
        doomed.push(id);
        if let Some(p) = self.node(id).parent {
            self.node_mut(p).children.retain(|c| *c != id);
        }
        for d in &doomed {
            self.unindex_paths(*d);
            let node = self.node_mut(*d);
            node.removed = true;
            let dn = node.dn.clone();
            self.by_dn.remove(&dn);
        }
        self.demote_targets(&doomed);
    }

    // ── Tags ─────────────────────────────────────────────────────────

    pub fn add_tag(&mut self, id: MoId, tag: &str) -> Result<(), CoreError> {
        dn::validate_name(tag)?;
        self.node_mut(id).tags.insert(tag.to_owned(), false);
        Ok(())
    }

    /// Tombstone a tag so the next emission removes it on the controller.
    /// Returns `false` when the tag was not present.
    pub fn remove_tag(&mut self, id: MoId, tag: &str) -> bool {
        match self.node_mut(id).tags.get_mut(tag) {
            Some(gone) if !*gone => {
                *gone = true;
                true
            }
            _ => false,
        }
    }

    pub fn has_tag(&self, id: MoId, tag: &str) -> bool {
        self.node(id).tags.get(tag).is_some_and(|gone| !gone)
    }

    pub(crate) fn tag_raw(&mut self, id: MoId, tag: &str, deleted: bool) {
        self.node_mut(id).tags.insert(tag.to_owned(), deleted);
    }
}
