// ── Class registry ──
//
// Static description of every managed-object class the toolkit models:
// controller class name, permitted parents, relative-name template,
// declared attributes with their valid values, and the relations the
// class may carry. DN and URL synthesis, JSON dispatch and deep-query
// class lists are all driven from this table.

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::dn;
use crate::graph::RelationKind;

/// Toolkit-level class of a managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum MoClass {
    // Logical tree
    Tenant,
    AppProfile,
    Epg,
    BridgeDomain,
    Subnet,
    Context,
    Contract,
    ContractSubject,
    Taboo,
    TabooSubject,
    Filter,
    FilterEntry,
    OutsideL3,
    OutsideEpg,
    OutsideNetwork,
    Endpoint,
    // Physical tree
    Fabric,
    Pod,
    Node,
    Linecard,
    Supervisor,
    Fantray,
    PowerSupply,
    Interface,
}

/// Where the relative-name key comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RnKey {
    /// The object's name.
    Name,
    /// A dedicated attribute (`ip`, `mac`, `id`); the name is separate.
    Attr(&'static str),
    /// The relative name is the prefix alone.
    Fixed,
}

/// A declared attribute.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    pub name: &'static str,
    /// Accepted values; `None` accepts any string.
    pub values: Option<&'static [&'static str]>,
    /// Value is a comma-separated list of members of `values`.
    pub list: bool,
}

const fn free(name: &'static str) -> AttrSpec {
    AttrSpec {
        name,
        values: None,
        list: false,
    }
}

const fn one_of(name: &'static str, values: &'static [&'static str]) -> AttrSpec {
    AttrSpec {
        name,
        values: Some(values),
        list: false,
    }
}

const fn list_of(name: &'static str, values: &'static [&'static str]) -> AttrSpec {
    AttrSpec {
        name,
        values: Some(values),
        list: true,
    }
}

const YES_NO: &[&str] = &["yes", "no"];

#[derive(Debug)]
pub struct ClassSpec {
    pub class: MoClass,
    pub apic_class: &'static str,
    /// Permitted graph parents; empty for roots.
    pub parents: &'static [MoClass],
    pub rn_prefix: &'static str,
    pub rn_suffix: &'static str,
    pub key: RnKey,
    /// DN is built under this ancestor rather than the direct parent.
    pub anchor: Option<MoClass>,
    /// DN a root object hangs from (`uni` for tenants).
    pub root_dn: Option<&'static str>,
    pub attributes: &'static [AttrSpec],
    pub relations: &'static [RelationKind],
}

// ── Logical classes ──────────────────────────────────────────────────

static TENANT: ClassSpec = ClassSpec {
    class: MoClass::Tenant,
    apic_class: "fvTenant",
    parents: &[],
    rn_prefix: "tn-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: Some("uni"),
    attributes: &[free("descr"), free("nameAlias")],
    relations: &[],
};

static APP_PROFILE: ClassSpec = ClassSpec {
    class: MoClass::AppProfile,
    apic_class: "fvAp",
    parents: &[MoClass::Tenant],
    rn_prefix: "ap-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[free("descr"), one_of("prio", &["unspecified", "level1", "level2", "level3"])],
    relations: &[],
};

static EPG: ClassSpec = ClassSpec {
    class: MoClass::Epg,
    apic_class: "fvAEPg",
    parents: &[MoClass::AppProfile],
    rn_prefix: "epg-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[
        free("descr"),
        one_of("pcEnfPref", &["enforced", "unenforced"]),
        one_of("prefGrMemb", &["include", "exclude"]),
        one_of("isAttrBasedEPg", YES_NO),
    ],
    relations: &[
        RelationKind::BridgeDomain,
        RelationKind::Provide,
        RelationKind::Consume,
        RelationKind::Protect,
        RelationKind::StaticPath,
    ],
};

static BRIDGE_DOMAIN: ClassSpec = ClassSpec {
    class: MoClass::BridgeDomain,
    apic_class: "fvBD",
    parents: &[MoClass::Tenant],
    rn_prefix: "BD-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[
        free("descr"),
        one_of("unkMcastAct", &["flood", "opt-flood"]),
        one_of("unkMacUcastAct", &["proxy", "flood"]),
        one_of("multiDstPktAct", &["bd-flood", "encap-flood", "drop"]),
        one_of("arpFlood", YES_NO),
        one_of("unicastRoute", YES_NO),
    ],
    relations: &[RelationKind::Context, RelationKind::BdOutside],
};

static SUBNET: ClassSpec = ClassSpec {
    class: MoClass::Subnet,
    apic_class: "fvSubnet",
    parents: &[MoClass::BridgeDomain],
    rn_prefix: "subnet-[",
    rn_suffix: "]",
    key: RnKey::Attr("ip"),
    anchor: None,
    root_dn: None,
    attributes: &[
        free("descr"),
        list_of("scope", &["private", "public", "shared"]),
        one_of("preferred", YES_NO),
    ],
    relations: &[],
};

static CONTEXT: ClassSpec = ClassSpec {
    class: MoClass::Context,
    apic_class: "fvCtx",
    parents: &[MoClass::Tenant],
    rn_prefix: "ctx-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[
        free("descr"),
        one_of("pcEnfPref", &["enforced", "unenforced"]),
        one_of("pcEnfDir", &["ingress", "egress"]),
    ],
    relations: &[],
};

static CONTRACT: ClassSpec = ClassSpec {
    class: MoClass::Contract,
    apic_class: "vzBrCP",
    parents: &[MoClass::Tenant],
    rn_prefix: "brc-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[
        free("descr"),
        one_of("scope", &["context", "global", "tenant", "application-profile"]),
    ],
    relations: &[],
};

static CONTRACT_SUBJECT: ClassSpec = ClassSpec {
    class: MoClass::ContractSubject,
    apic_class: "vzSubj",
    parents: &[MoClass::Contract],
    rn_prefix: "subj-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[free("descr"), one_of("revFltPorts", YES_NO)],
    relations: &[RelationKind::SubjectFilter],
};

static TABOO: ClassSpec = ClassSpec {
    class: MoClass::Taboo,
    apic_class: "vzTaboo",
    parents: &[MoClass::Tenant],
    rn_prefix: "taboo-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[free("descr")],
    relations: &[],
};

static TABOO_SUBJECT: ClassSpec = ClassSpec {
    class: MoClass::TabooSubject,
    apic_class: "vzTSubj",
    parents: &[MoClass::Taboo],
    rn_prefix: "tsubj-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[free("descr")],
    relations: &[RelationKind::DenyRule],
};

static FILTER: ClassSpec = ClassSpec {
    class: MoClass::Filter,
    apic_class: "vzFilter",
    parents: &[MoClass::Tenant],
    rn_prefix: "flt-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[free("descr")],
    relations: &[],
};

static FILTER_ENTRY: ClassSpec = ClassSpec {
    class: MoClass::FilterEntry,
    apic_class: "vzEntry",
    parents: &[MoClass::Filter],
    rn_prefix: "e-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[
        one_of(
            "etherT",
            &["unspecified", "ipv4", "ipv6", "ip", "arp", "trill", "mpls_ucast", "mac_security", "fcoe"],
        ),
        free("prot"),
        free("sFromPort"),
        free("sToPort"),
        free("dFromPort"),
        free("dToPort"),
        free("tcpRules"),
        one_of("arpOpc", &["unspecified", "req", "reply"]),
        free("icmpv4T"),
        one_of("applyToFrag", YES_NO),
        one_of("stateful", YES_NO),
    ],
    relations: &[],
};

static OUTSIDE_L3: ClassSpec = ClassSpec {
    class: MoClass::OutsideL3,
    apic_class: "l3extOut",
    parents: &[MoClass::Tenant],
    rn_prefix: "out-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[free("descr"), list_of("enforceRtctrl", &["export", "import"])],
    relations: &[RelationKind::L3Context],
};

static OUTSIDE_EPG: ClassSpec = ClassSpec {
    class: MoClass::OutsideEpg,
    apic_class: "l3extInstP",
    parents: &[MoClass::OutsideL3],
    rn_prefix: "instP-",
    rn_suffix: "",
    key: RnKey::Name,
    anchor: None,
    root_dn: None,
    attributes: &[free("descr"), one_of("prefGrMemb", &["include", "exclude"])],
    relations: &[RelationKind::Provide, RelationKind::Consume],
};

static OUTSIDE_NETWORK: ClassSpec = ClassSpec {
    class: MoClass::OutsideNetwork,
    apic_class: "l3extSubnet",
    parents: &[MoClass::OutsideEpg],
    rn_prefix: "extsubnet-[",
    rn_suffix: "]",
    key: RnKey::Attr("ip"),
    anchor: None,
    root_dn: None,
    attributes: &[list_of(
        "scope",
        &["import-rtctrl", "export-rtctrl", "import-security", "shared-security", "shared-rtctrl"],
    )],
    relations: &[],
};

static ENDPOINT: ClassSpec = ClassSpec {
    class: MoClass::Endpoint,
    apic_class: "fvCEp",
    parents: &[MoClass::Epg],
    rn_prefix: "cep-",
    rn_suffix: "",
    key: RnKey::Attr("mac"),
    anchor: None,
    root_dn: None,
    attributes: &[free("ip"), free("encap")],
    relations: &[],
};

// ── Physical classes ─────────────────────────────────────────────────

static FABRIC: ClassSpec = ClassSpec {
    class: MoClass::Fabric,
    apic_class: "fabricTopology",
    parents: &[],
    rn_prefix: "topology",
    rn_suffix: "",
    key: RnKey::Fixed,
    anchor: None,
    root_dn: None,
    attributes: &[],
    relations: &[],
};

static POD: ClassSpec = ClassSpec {
    class: MoClass::Pod,
    apic_class: "fabricPod",
    parents: &[MoClass::Fabric],
    rn_prefix: "pod-",
    rn_suffix: "",
    key: RnKey::Attr("id"),
    anchor: None,
    root_dn: None,
    attributes: &[],
    relations: &[],
};

static NODE: ClassSpec = ClassSpec {
    class: MoClass::Node,
    apic_class: "fabricNode",
    parents: &[MoClass::Pod],
    rn_prefix: "node-",
    rn_suffix: "",
    key: RnKey::Attr("id"),
    anchor: None,
    root_dn: None,
    attributes: &[
        one_of("role", &["controller", "leaf", "spine"]),
        free("model"),
        free("serial"),
        free("fabricSt"),
    ],
    relations: &[],
};

static LINECARD: ClassSpec = ClassSpec {
    class: MoClass::Linecard,
    apic_class: "eqptLC",
    parents: &[MoClass::Node],
    rn_prefix: "sys/ch/lcslot-",
    rn_suffix: "/lc",
    key: RnKey::Attr("id"),
    anchor: None,
    root_dn: None,
    attributes: &[free("model"), free("ser"), free("numP")],
    relations: &[],
};

static SUPERVISOR: ClassSpec = ClassSpec {
    class: MoClass::Supervisor,
    apic_class: "eqptSupC",
    parents: &[MoClass::Node],
    rn_prefix: "sys/ch/supslot-",
    rn_suffix: "/sup",
    key: RnKey::Attr("id"),
    anchor: None,
    root_dn: None,
    attributes: &[free("model"), free("ser"), free("rdSt")],
    relations: &[],
};

static FANTRAY: ClassSpec = ClassSpec {
    class: MoClass::Fantray,
    apic_class: "eqptFt",
    parents: &[MoClass::Node],
    rn_prefix: "sys/ch/ftslot-",
    rn_suffix: "/ft",
    key: RnKey::Attr("id"),
    anchor: None,
    root_dn: None,
    attributes: &[free("model"), free("ser"), free("operSt")],
    relations: &[],
};

static POWER_SUPPLY: ClassSpec = ClassSpec {
    class: MoClass::PowerSupply,
    apic_class: "eqptPsu",
    parents: &[MoClass::Node],
    rn_prefix: "sys/ch/psuslot-",
    rn_suffix: "/psu",
    key: RnKey::Attr("id"),
    anchor: None,
    root_dn: None,
    attributes: &[free("model"), free("ser"), free("operSt")],
    relations: &[],
};

static INTERFACE: ClassSpec = ClassSpec {
    class: MoClass::Interface,
    apic_class: "l1PhysIf",
    parents: &[MoClass::Linecard, MoClass::Node],
    rn_prefix: "sys/phys-[",
    rn_suffix: "]",
    key: RnKey::Attr("id"),
    anchor: Some(MoClass::Node),
    root_dn: None,
    attributes: &[
        one_of("adminSt", &["up", "down"]),
        one_of("speed", &["inherit", "100M", "1G", "10G", "25G", "40G", "100G", "400G"]),
        one_of("mode", &["trunk", "access", "fex-fabric"]),
        free("mtu"),
        free("descr"),
    ],
    relations: &[],
};

impl MoClass {
    pub fn spec(self) -> &'static ClassSpec {
        match self {
            Self::Tenant => &TENANT,
            Self::AppProfile => &APP_PROFILE,
            Self::Epg => &EPG,
            Self::BridgeDomain => &BRIDGE_DOMAIN,
            Self::Subnet => &SUBNET,
            Self::Context => &CONTEXT,
            Self::Contract => &CONTRACT,
            Self::ContractSubject => &CONTRACT_SUBJECT,
            Self::Taboo => &TABOO,
            Self::TabooSubject => &TABOO_SUBJECT,
            Self::Filter => &FILTER,
            Self::FilterEntry => &FILTER_ENTRY,
            Self::OutsideL3 => &OUTSIDE_L3,
            Self::OutsideEpg => &OUTSIDE_EPG,
            Self::OutsideNetwork => &OUTSIDE_NETWORK,
            Self::Endpoint => &ENDPOINT,
            Self::Fabric => &FABRIC,
            Self::Pod => &POD,
            Self::Node => &NODE,
            Self::Linecard => &LINECARD,
            Self::Supervisor => &SUPERVISOR,
            Self::Fantray => &FANTRAY,
            Self::PowerSupply => &POWER_SUPPLY,
            Self::Interface => &INTERFACE,
        }
    }

    /// Controller class name (`fvTenant`, `l1PhysIf`, ...).
    pub fn apic_class(self) -> &'static str {
        self.spec().apic_class
    }

    /// Dispatch a controller class name to its toolkit class.
    pub fn from_apic(apic_class: &str) -> Option<Self> {
        Self::iter().find(|c| c.apic_class() == apic_class)
    }

    pub fn is_root(self) -> bool {
        self.spec().parents.is_empty()
    }

    pub fn is_physical(self) -> bool {
        self >= Self::Fabric
    }

    /// Relative name for a key value.
    pub fn rn(self, key: &str) -> String {
        let spec = self.spec();
        match spec.key {
            RnKey::Fixed => spec.rn_prefix.to_owned(),
            RnKey::Name | RnKey::Attr(_) => format!("{}{key}{}", spec.rn_prefix, spec.rn_suffix),
        }
    }

    /// Split a DN of this class into (anchor DN, key).
    ///
    /// The anchor DN is the parent's DN, or the anchor ancestor's DN for
    /// classes built under one.
    pub fn parse_dn(self, dn: &str) -> Option<(&str, &str)> {
        let spec = self.spec();
        if spec.key == RnKey::Fixed {
            return (dn == spec.rn_prefix).then_some(("", ""));
        }
        let body = dn.strip_suffix(spec.rn_suffix)?;
        let bracketed = spec.rn_prefix.ends_with('[');
        let needle = format!("/{}", spec.rn_prefix);

        let i = body.rfind(&needle)?;
        let (parent, key) = (&body[..i], &body[i + needle.len()..]);
        if key.is_empty() || (!bracketed && key.contains('/')) {
            return None;
        }
        if let Some(root) = spec.root_dn {
            if parent != root {
                return None;
            }
        }
        Some((parent, key))
    }

    /// Every class that can appear below `root` in the graph.
    pub fn descendants(root: Self) -> Vec<Self> {
        let mut found = vec![root];
        let mut grew = true;
        while grew {
            grew = false;
            for class in Self::iter() {
                if !found.contains(&class) && class.spec().parents.iter().any(|p| found.contains(p)) {
                    found.push(class);
                    grew = true;
                }
            }
        }
        found.retain(|c| *c != root);
        found
    }

    /// Validate `value` for attribute `attr`; undeclared attributes pass.
    pub fn validate_attribute(self, attr: &str, value: &str) -> Result<(), String> {
        let Some(spec) = self.spec().attributes.iter().find(|a| a.name == attr) else {
            return Ok(());
        };
        let Some(allowed) = spec.values else {
            return Ok(());
        };
        let ok = if spec.list {
            value.split(',').map(str::trim).all(|v| allowed.contains(&v))
        } else {
            allowed.contains(&value)
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "{}.{attr} must be {}{}, got `{value}`",
                self.apic_class(),
                if spec.list { "a comma list of " } else { "one of " },
                allowed.join("|")
            ))
        }
    }
}

/// The class a DN belongs to, found by trying every registered template.
pub fn class_of_dn(dn_str: &str) -> Option<MoClass> {
    if dn::parent_dn(dn_str).is_none() && dn_str != FABRIC.rn_prefix {
        return None;
    }
    MoClass::iter().find(|c| c.parse_dn(dn_str).is_some())
}
