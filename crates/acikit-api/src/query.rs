//! Controller query URL construction.
//!
//! The controller's read grammar is a path naming either a class or a
//! distinguished name, followed by a fixed set of query modifiers:
//!
//! ```text
//! /api/class/fvTenant.json?query-target=self
//! /api/mo/uni/tn-t1.json?query-target=subtree&target-subtree-class=fvAp,fvAEPg
//! ```
//!
//! [`Query`] produces these strings. The output is a path plus query
//! string relative to the session's base URL, exactly as the controller
//! expects it (no percent-encoding of DN segments).

use std::fmt;

/// `query-target` modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTarget {
    SelfOnly,
    Children,
    Subtree,
}

impl QueryTarget {
    fn as_str(self) -> &'static str {
        match self {
            Self::SelfOnly => "self",
            Self::Children => "children",
            Self::Subtree => "subtree",
        }
    }
}

/// `rsp-subtree` modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RspSubtree {
    No,
    Children,
    Full,
}

impl RspSubtree {
    fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Children => "children",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Class { class: String, node: bool },
    Mo { dn: String },
}

/// Builder for controller read URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    scope: Scope,
    params: Vec<(String, String)>,
}

impl Query {
    /// `/api/class/<class>.json`
    pub fn class(class: impl Into<String>) -> Self {
        Self {
            scope: Scope::Class {
                class: class.into(),
                node: false,
            },
            params: Vec::new(),
        }
    }

    /// `/api/node/class/<class>.json`
    pub fn node_class(class: impl Into<String>) -> Self {
        Self {
            scope: Scope::Class {
                class: class.into(),
                node: true,
            },
            params: Vec::new(),
        }
    }

    /// `/api/mo/<dn>.json`
    pub fn mo(dn: impl Into<String>) -> Self {
        Self {
            scope: Scope::Mo { dn: dn.into() },
            params: Vec::new(),
        }
    }

    pub fn query_target(self, target: QueryTarget) -> Self {
        self.param("query-target", target.as_str())
    }

    /// `target-subtree-class`, comma-joined.
    pub fn target_subtree_class<I, S>(self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = join(classes);
        self.param("target-subtree-class", &joined)
    }

    pub fn rsp_subtree(self, subtree: RspSubtree) -> Self {
        self.param("rsp-subtree", subtree.as_str())
    }

    /// `rsp-subtree-class`, comma-joined.
    pub fn rsp_subtree_class<I, S>(self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = join(classes);
        self.param("rsp-subtree-class", &joined)
    }

    /// `rsp-subtree-include`, e.g. `faults` or `health`.
    pub fn rsp_subtree_include(self, include: &str) -> Self {
        self.param("rsp-subtree-include", include)
    }

    /// `rsp-prop-include`, e.g. `config-only`.
    pub fn rsp_prop_include(self, include: &str) -> Self {
        self.param("rsp-prop-include", include)
    }

    /// `query-target-filter`, e.g. `eq(fvTenant.name,"t1")`.
    pub fn filter(self, expr: &str) -> Self {
        self.param("query-target-filter", expr)
    }

    /// `subscription=yes`
    pub fn subscribe(self) -> Self {
        self.param("subscription", "yes")
    }

    /// Append (or replace) an arbitrary parameter.
    pub fn param(mut self, key: &str, value: &str) -> Self {
        if let Some(slot) = self.params.iter_mut().find(|(k, _)| k == key) {
            value.clone_into(&mut slot.1);
        } else {
            self.params.push((key.to_owned(), value.to_owned()));
        }
        self
    }

    /// Render the relative URL.
    pub fn to_url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Class { class, node: false } => write!(f, "/api/class/{class}.json")?,
            Scope::Class { class, node: true } => write!(f, "/api/node/class/{class}.json")?,
            Scope::Mo { dn } => write!(f, "/api/mo/{dn}.json")?,
        }
        for (i, (key, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

fn join<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join(",")
}

// ── Raw URL helpers ──────────────────────────────────────────────────

/// Set (or replace) one query parameter on an already rendered URL.
pub fn with_param(url: &str, key: &str, value: &str) -> String {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let mut pairs: Vec<(String, String)> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (k, v) = p.split_once('=').unwrap_or((p, ""));
            (k.to_owned(), v.to_owned())
        })
        .collect();
    if let Some(slot) = pairs.iter_mut().find(|(k, _)| k == key) {
        value.clone_into(&mut slot.1);
    } else {
        pairs.push((key.to_owned(), value.to_owned()));
    }
    let query = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}

/// Read one query parameter from a rendered URL.
pub fn param_value<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// Path portion of a rendered URL (the part that gets signed).
pub fn path_of(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_query_with_modifiers() {
        let url = Query::class("fvTenant")
            .query_target(QueryTarget::SelfOnly)
            .filter("eq(fvTenant.name,\"t1\")")
            .to_url();
        assert_eq!(
            url,
            "/api/class/fvTenant.json?query-target=self&query-target-filter=eq(fvTenant.name,\"t1\")"
        );
    }

    #[test]
    fn mo_subtree_query_joins_classes() {
        let url = Query::mo("uni/tn-t1")
            .query_target(QueryTarget::Subtree)
            .target_subtree_class(["fvAp", "fvAEPg"])
            .to_url();
        assert_eq!(
            url,
            "/api/mo/uni/tn-t1.json?query-target=subtree&target-subtree-class=fvAp,fvAEPg"
        );
    }

    #[test]
    fn bracketed_dn_not_encoded() {
        let url = Query::mo("uni/tn-t1/BD-bd1/subnet-[10.1.1.1/24]").to_url();
        assert_eq!(url, "/api/mo/uni/tn-t1/BD-bd1/subnet-[10.1.1.1/24].json");
    }

    #[test]
    fn node_class_prefix() {
        assert_eq!(
            Query::node_class("fabricNode").to_url(),
            "/api/node/class/fabricNode.json"
        );
    }

    #[test]
    fn repeated_param_replaces() {
        let url = Query::class("fvTenant").subscribe().param("subscription", "no");
        assert_eq!(url.to_url(), "/api/class/fvTenant.json?subscription=no");
    }

    #[test]
    fn raw_url_param_editing() {
        let url = "/api/class/fvTenant.json?subscription=yes";
        assert_eq!(
            with_param(url, "subscription", "no"),
            "/api/class/fvTenant.json?subscription=no"
        );
        assert_eq!(
            with_param("/api/class/fvTenant.json", "page", "1"),
            "/api/class/fvTenant.json?page=1"
        );
        assert_eq!(param_value(url, "subscription"), Some("yes"));
        assert_eq!(path_of(url), "/api/class/fvTenant.json");
    }
}
