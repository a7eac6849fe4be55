// Distinguished-name helpers.
//
// A DN is a `/`-joined chain of relative names. Bracketed keys
// (`phys-[eth1/1]`, `subnet-[10.0.0.1/24]`, `rspathAtt-[topology/...]`)
// may contain `/` and nested brackets, so every split here tracks
// bracket depth.

use crate::error::CoreError;

/// Maximum length of a user-supplied object name.
pub const MAX_NAME_LEN: usize = 64;

/// Split `dn` into its relative names.
pub fn split_rns(dn: &str) -> Vec<&str> {
    let mut rns = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in dn.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                rns.push(&dn[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < dn.len() {
        rns.push(&dn[start..]);
    }
    rns
}

/// Byte offset of the last top-level `/`, if any.
fn last_separator(dn: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut found = None;
    for (i, c) in dn.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => found = Some(i),
            _ => {}
        }
    }
    found
}

/// DN with the last relative name stripped; `None` for a root.
pub fn parent_dn(dn: &str) -> Option<&str> {
    last_separator(dn).map(|i| &dn[..i])
}

/// The last relative name.
pub fn last_rn(dn: &str) -> &str {
    last_separator(dn).map_or(dn, |i| &dn[i + 1..])
}

pub fn join(parent: &str, rn: &str) -> String {
    if parent.is_empty() {
        rn.to_owned()
    } else {
        format!("{parent}/{rn}")
    }
}

/// `uni/tn-<name>` prefix of a DN inside a tenant.
pub fn tenant_dn(dn: &str) -> Option<String> {
    let rns = split_rns(dn);
    match rns.as_slice() {
        ["uni", tn, ..] if tn.starts_with("tn-") => Some(format!("uni/{tn}")),
        _ => None,
    }
}

/// `true` when `dn` lies strictly below `ancestor`.
pub fn is_descendant(dn: &str, ancestor: &str) -> bool {
    dn.len() > ancestor.len() + 1
        && dn.starts_with(ancestor)
        && dn.as_bytes().get(ancestor.len()) == Some(&b'/')
}

/// Names are 1-64 characters from `[A-Za-z0-9_.:-]`.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::invalid_argument("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::invalid_argument(format!(
            "name `{name}` longer than {MAX_NAME_LEN} characters"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')))
    {
        return Err(CoreError::invalid_argument(format!(
            "name `{name}` contains invalid character `{bad}`"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_bracketed_keys_whole() {
        assert_eq!(
            split_rns("topology/pod-1/node-101/sys/phys-[eth1/1]"),
            vec!["topology", "pod-1", "node-101", "sys", "phys-[eth1/1]"]
        );
        assert_eq!(
            split_rns("uni/tn-a/ap-b/epg-c/rspathAtt-[topology/pod-1/paths-101/pathep-[eth1/1]]"),
            vec![
                "uni",
                "tn-a",
                "ap-b",
                "epg-c",
                "rspathAtt-[topology/pod-1/paths-101/pathep-[eth1/1]]"
            ]
        );
    }

    #[test]
    fn parent_and_last() {
        assert_eq!(parent_dn("uni/tn-a/BD-b/subnet-[10.0.0.1/24]"), Some("uni/tn-a/BD-b"));
        assert_eq!(last_rn("uni/tn-a/BD-b/subnet-[10.0.0.1/24]"), "subnet-[10.0.0.1/24]");
        assert_eq!(parent_dn("uni"), None);
        assert_eq!(last_rn("uni"), "uni");
    }

    #[test]
    fn tenant_prefix() {
        assert_eq!(tenant_dn("uni/tn-a/ap-b").as_deref(), Some("uni/tn-a"));
        assert_eq!(tenant_dn("topology/pod-1"), None);
    }

    #[test]
    fn descendant_needs_separator() {
        assert!(is_descendant("uni/tn-a/ap-b", "uni/tn-a"));
        assert!(!is_descendant("uni/tn-ab", "uni/tn-a"));
        assert!(!is_descendant("uni/tn-a", "uni/tn-a"));
    }

    #[test]
    fn name_rules() {
        assert!(validate_name("web-01.prod:x_y").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name(&"a".repeat(65)).is_err());
    }
}
