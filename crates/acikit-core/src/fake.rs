// ── In-memory controller ──
//
// A DN-keyed object store that answers the same read URLs as a real
// controller and accepts pushed trees. Used for offline tests of
// anything written against `ApicClient`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use acikit_api::query::{param_value, path_of};
use acikit_api::{ApicClient, ApicResponse, Error};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::dn;
use crate::error::CoreError;
use crate::graph::RelationKind;
use crate::registry::{MoClass, RnKey};
use crate::wire::{Item, TAG_CLASS};

#[derive(Debug, Clone)]
struct StoredMo {
    class: String,
    /// Every attribute, `dn` included.
    attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    SelfOnly,
    Children,
    Subtree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subtree {
    No,
    Children,
    Full,
}

/// `eq(class.attr,"value")`
#[derive(Debug)]
struct EqFilter {
    class: String,
    attr: String,
    value: String,
}

impl EqFilter {
    fn parse(expr: &str) -> Option<Self> {
        let body = expr.strip_prefix("eq(")?.strip_suffix(')')?;
        let (prop, value) = body.split_once(',')?;
        let (class, attr) = prop.split_once('.')?;
        let value = value.trim().trim_matches('"');
        Some(Self {
            class: class.to_owned(),
            attr: attr.to_owned(),
            value: value.to_owned(),
        })
    }

    fn matches(&self, mo: &StoredMo) -> bool {
        mo.class != self.class
            || mo.attributes.get(&self.attr).and_then(Value::as_str) == Some(self.value.as_str())
    }
}

/// In-memory stand-in for a controller.
#[derive(Debug, Default)]
pub struct FakeController {
    objects: RwLock<BTreeMap<String, StoredMo>>,
    queries: AtomicUsize,
}

impl FakeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load hierarchical or flat `{className: {...}}` items.
    pub fn from_items(items: &[Value]) -> Result<Self, CoreError> {
        let fake = Self::new();
        {
            let mut objects = fake.objects.write().expect("fake store lock poisoned");
            for item in items {
                merge(&mut objects, "", &[], item)?;
            }
        }
        Ok(fake)
    }

    /// Load a controller dump: `{"imdata": [...]}`, a bare array, or one item.
    pub fn from_json(value: &Value) -> Result<Self, CoreError> {
        match value {
            Value::Array(items) => Self::from_items(items),
            Value::Object(map) => match map.get("imdata") {
                Some(Value::Array(items)) => Self::from_items(items),
                _ => Self::from_items(std::slice::from_ref(value)),
            },
            _ => Err(CoreError::invalid_structure("controller dump must be an object or array")),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::invalid_argument(format!("cannot read {}: {e}", path.display()))
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            CoreError::invalid_structure(format!("{} is not JSON: {e}", path.display()))
        })?;
        Self::from_json(&value)
    }

    /// Number of read requests answered so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn reset_query_count(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("fake store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.objects.read().expect("fake store lock poisoned").contains_key(dn)
    }

    /// The stored object at `dn` as a flat item.
    pub fn object(&self, dn: &str) -> Option<Value> {
        let objects = self.objects.read().expect("fake store lock poisoned");
        objects.get(dn).map(|mo| flat_item(mo, Vec::new()))
    }

    /// Answer a read URL.
    pub fn query(&self, url: &str) -> Result<ApicResponse, Error> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let path = path_of(url);
        let objects = self.objects.read().expect("fake store lock poisoned");

        let target = match param_value(url, "query-target") {
            None | Some("self") => Target::SelfOnly,
            Some("children") => Target::Children,
            Some("subtree") => Target::Subtree,
            Some(other) => return Err(bad_request(&format!("unsupported query-target {other}"))),
        };
        let subtree = match param_value(url, "rsp-subtree") {
            None | Some("no") => Subtree::No,
            Some("children") => Subtree::Children,
            Some("full") => Subtree::Full,
            Some(other) => return Err(bad_request(&format!("unsupported rsp-subtree {other}"))),
        };
        let classes: Option<Vec<&str>> =
            param_value(url, "target-subtree-class").map(|c| c.split(',').collect());
        let filter = match param_value(url, "query-target-filter") {
            None => None,
            Some(expr) => Some(
                EqFilter::parse(expr).ok_or_else(|| bad_request(&format!("unsupported filter {expr}")))?,
            ),
        };

        let selected: Vec<&StoredMo> = if let Some(class) = class_path(path) {
            objects.values().filter(|mo| mo.class == class).collect()
        } else if let Some(base) = mo_path(path) {
            let Some(root) = objects.get(base) else {
                return Ok(ApicResponse::from_items(Vec::new()));
            };
            let below = objects.iter().filter(|(dn, _)| match target {
                Target::SelfOnly => false,
                Target::Children => dn::parent_dn(dn) == Some(base),
                Target::Subtree => dn::is_descendant(dn, base),
            });
            let mut found = Vec::new();
            if target != Target::Children {
                found.push(root);
            }
            found.extend(below.map(|(_, mo)| mo));
            if target != Target::SelfOnly {
                if let Some(classes) = &classes {
                    found.retain(|mo| classes.contains(&mo.class.as_str()));
                }
            }
            found
        } else {
            return Err(bad_request(&format!("unsupported URL {path}")));
        };

        let imdata = selected
            .into_iter()
            .filter(|mo| filter.as_ref().is_none_or(|f| f.matches(mo)))
            .map(|mo| {
                let children = match subtree {
                    Subtree::No => Vec::new(),
                    Subtree::Children => nested(&objects, mo, false),
                    Subtree::Full => nested(&objects, mo, true),
                };
                flat_item(mo, children)
            })
            .collect();
        Ok(ApicResponse::from_items(imdata))
    }

    /// Merge a pushed tree. `status: deleted` removes the object and
    /// everything below it.
    pub fn push(&self, url: &str, data: &Value) -> Result<ApicResponse, Error> {
        let path = path_of(url);
        if path == "/api/aaaLogin.json" || path == "/api/aaaRefresh.json" {
            return Ok(ApicResponse::from_items(vec![json!({
                "aaaLogin": {"attributes": {
                    "token": "fake-token",
                    "refreshTimeoutSeconds": "600",
                }}
            })]));
        }
        let base = mo_path(path).ok_or_else(|| bad_request(&format!("unsupported URL {path}")))?;
        let mut objects = self.objects.write().expect("fake store lock poisoned");
        merge(&mut objects, base, &[], data).map_err(|e| bad_request(&e.to_string()))?;
        Ok(ApicResponse::from_items(Vec::new()))
    }
}

impl ApicClient for FakeController {
    async fn get(&self, url: &str) -> Result<ApicResponse, Error> {
        self.query(url)
    }

    async fn push_to_apic(&self, url: &str, data: &Value) -> Result<ApicResponse, Error> {
        self.push(url, data)
    }
}

// ── URL grammar ──────────────────────────────────────────────────────

fn class_path(path: &str) -> Option<&str> {
    path.strip_prefix("/api/class/")
        .or_else(|| path.strip_prefix("/api/node/class/"))?
        .strip_suffix(".json")
}

fn mo_path(path: &str) -> Option<&str> {
    path.strip_prefix("/api/mo/")
        .or_else(|| path.strip_prefix("/api/node/mo/"))?
        .strip_suffix(".json")
}

fn bad_request(text: &str) -> Error {
    Error::Controller {
        status: 400,
        code: "400".into(),
        text: text.to_owned(),
    }
}

// ── Store maintenance ────────────────────────────────────────────────

/// Merge `value` into the store. `context` is the DN the item was posted
/// to (or its parent's DN during recursion); `ancestors` holds the
/// `(dn, class)` chain above it.
fn merge(
    objects: &mut BTreeMap<String, StoredMo>,
    context: &str,
    ancestors: &[(String, String)],
    value: &Value,
) -> Result<(), CoreError> {
    let item = Item::parse(value)
        .ok_or_else(|| CoreError::invalid_structure(format!("malformed item: {value}")))?;
    let item_dn = item_dn(objects, context, ancestors, &item)?;

    if item.is_deleted() {
        objects.retain(|dn, _| dn != &item_dn && !dn::is_descendant(dn, &item_dn));
        debug!(dn = %item_dn, "fake controller removed subtree");
        return Ok(());
    }

    let entry = objects.entry(item_dn.clone()).or_insert_with(|| StoredMo {
        class: item.class.to_owned(),
        attributes: Map::new(),
    });
    for (k, v) in item.attributes.into_iter().flatten() {
        if k != "status" {
            entry.attributes.insert(k.clone(), v.clone());
        }
    }
    entry
        .attributes
        .insert("dn".into(), Value::String(item_dn.clone()));
    if let Some(kind) = RelationKind::from_apic(item.class) {
        fill_target_dn(objects, &item_dn, kind);
    }

    let mut chain = ancestors.to_vec();
    chain.push((item_dn.clone(), item.class.to_owned()));
    for child in item.children {
        merge(objects, &item_dn, &chain, child)?;
    }
    Ok(())
}

fn item_dn(
    objects: &BTreeMap<String, StoredMo>,
    context: &str,
    ancestors: &[(String, String)],
    item: &Item<'_>,
) -> Result<String, CoreError> {
    if let Some(dn) = item.attr("dn") {
        return Ok(dn.to_owned());
    }
    let rn = match item.attr("rn") {
        Some(rn) => rn.to_owned(),
        None => derived_rn(item)?,
    };

    // A top-level item posted to its own URL.
    if ancestors.is_empty() && (context == rn || context.ends_with(&format!("/{rn}"))) {
        return Ok(context.to_owned());
    }

    let base = match MoClass::from_apic(item.class).map(MoClass::spec) {
        Some(spec) if spec.parents.is_empty() => spec.root_dn.unwrap_or_default().to_owned(),
        Some(spec) => match spec.anchor {
            Some(anchor) => anchor_dn(objects, context, ancestors, anchor),
            None => context.to_owned(),
        },
        None => context.to_owned(),
    };
    Ok(dn::join(&base, &rn))
}

fn anchor_dn(
    objects: &BTreeMap<String, StoredMo>,
    context: &str,
    ancestors: &[(String, String)],
    anchor: MoClass,
) -> String {
    if let Some((dn, _)) = ancestors.iter().rev().find(|(_, c)| c == anchor.apic_class()) {
        return dn.clone();
    }
    let mut dn = Some(context);
    while let Some(d) = dn {
        if objects.get(d).is_some_and(|mo| mo.class == anchor.apic_class()) {
            return d.to_owned();
        }
        dn = dn::parent_dn(d);
    }
    context.to_owned()
}

fn derived_rn(item: &Item<'_>) -> Result<String, CoreError> {
    if let Some(class) = MoClass::from_apic(item.class) {
        let key = match class.spec().key {
            RnKey::Fixed => Some(""),
            RnKey::Name => item.attr("name"),
            RnKey::Attr(attr) => item.attr(attr),
        };
        return key
            .map(|k| class.rn(k))
            .ok_or_else(|| CoreError::invalid_structure(format!("{} item without a key", item.class)));
    }
    if let Some(kind) = RelationKind::from_apic(item.class) {
        let target = kind
            .spec()
            .name_attr
            .and_then(|a| item.attr(a))
            .or_else(|| item.attr("tDn"))
            .unwrap_or_default();
        return Ok(kind.rn(target));
    }
    if item.class == TAG_CLASS {
        if let Some(name) = item.attr("name") {
            return Ok(format!("tag-{name}"));
        }
    }
    Err(CoreError::invalid_structure(format!(
        "cannot name {} item without dn or rn",
        item.class
    )))
}

/// Resolve a name-only reference the way the controller does: the
/// source's tenant first, then `common`.
fn fill_target_dn(objects: &mut BTreeMap<String, StoredMo>, rel_dn: &str, kind: RelationKind) {
    let spec = kind.spec();
    let (Some(name_attr), Some(target_class)) = (spec.name_attr, spec.target) else {
        return;
    };
    let Some(rel) = objects.get(rel_dn) else {
        return;
    };
    let Some(name) = rel.attributes.get(name_attr).and_then(Value::as_str).filter(|n| !n.is_empty()) else {
        return;
    };
    let rn = target_class.rn(name);
    let own = dn::tenant_dn(rel_dn).map(|t| dn::join(&t, &rn));
    let common = dn::join("uni/tn-common", &rn);
    let t_dn = match own {
        Some(own) if objects.contains_key(&own) => own,
        _ if objects.contains_key(&common) => common,
        Some(own) => own,
        None => common,
    };
    if let Some(rel) = objects.get_mut(rel_dn) {
        rel.attributes.insert("tDn".into(), Value::String(t_dn));
    }
}

// ── Response shaping ─────────────────────────────────────────────────

fn flat_item(mo: &StoredMo, children: Vec<Value>) -> Value {
    let mut body = Map::new();
    body.insert("attributes".into(), Value::Object(mo.attributes.clone()));
    if !children.is_empty() {
        body.insert("children".into(), Value::Array(children));
    }
    let mut item = Map::new();
    item.insert(mo.class.clone(), Value::Object(body));
    Value::Object(item)
}

fn nested(objects: &BTreeMap<String, StoredMo>, mo: &StoredMo, full: bool) -> Vec<Value> {
    let Some(dn) = mo.attributes.get("dn").and_then(Value::as_str) else {
        return Vec::new();
    };
    objects
        .iter()
        .filter(|(child, _)| dn::parent_dn(child) == Some(dn))
        .map(|(_, child)| {
            let grandchildren = if full { nested(objects, child, true) } else { Vec::new() };
            flat_item(child, grandchildren)
        })
        .collect()
}
