// ── Interfaces ──
//
// Interface identities and the leaf-port paths EPGs bind to. Physical
// ports parse from controller-style names (`eth 1/101/1/12`, pod / node /
// module / port) and from inventory or path DNs.

use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumString};

use crate::dn;
use crate::error::CoreError;

/// Capability set shared by every interface variant.
pub trait InterfaceCapabilities {
    fn is_interface(&self) -> bool {
        true
    }

    fn is_port_channel(&self) -> bool {
        false
    }

    fn is_vpc(&self) -> bool {
        false
    }

    fn is_ethernet(&self) -> bool {
        false
    }

    fn is_fex(&self) -> bool {
        false
    }

    /// Path DN used by static bindings.
    fn path(&self) -> Result<String, CoreError>;
}

/// Split an interface name into `(type, pod, node, module, port)`.
///
/// Accepts `eth 1/2/3/4` and `eth1/2/3/4`.
pub fn parse_name(name: &str) -> Result<(String, String, String, String, String), CoreError> {
    let (if_type, numbers) = split_name(name)?;
    match numbers.as_slice() {
        [pod, node, module, port] => Ok((
            if_type.to_owned(),
            (*pod).to_owned(),
            (*node).to_owned(),
            (*module).to_owned(),
            (*port).to_owned(),
        )),
        _ => Err(malformed(name)),
    }
}

fn split_name(name: &str) -> Result<(&str, Vec<&str>), CoreError> {
    let name = name.trim();
    let type_end = name
        .find(|c: char| !c.is_ascii_alphabetic())
        .ok_or_else(|| malformed(name))?;
    let (if_type, rest) = name.split_at(type_end);
    if if_type.is_empty() {
        return Err(malformed(name));
    }
    let numbers: Vec<&str> = rest.trim_start().split('/').collect();
    if numbers.iter().any(|n| n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit())) {
        return Err(malformed(name));
    }
    Ok((if_type, numbers))
}

fn malformed(name: &str) -> CoreError {
    CoreError::invalid_argument(format!(
        "malformed interface name `{name}`, expected e.g. `eth 1/101/1/1`"
    ))
}

// ── Physical ports ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalInterface {
    pub if_type: String,
    pub pod: String,
    pub node: String,
    /// Fabric extender id when the port sits on a FEX.
    pub fex: Option<String>,
    pub module: String,
    pub port: String,
}

impl PhysicalInterface {
    /// Parse `eth P/N/M/P`, or `eth P/N/F/M/P` for a FEX port.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        let (if_type, numbers) = split_name(name)?;
        let owned = |s: &&str| (*s).to_owned();
        match numbers.as_slice() {
            [pod, node, module, port] => Ok(Self {
                if_type: if_type.to_owned(),
                pod: owned(pod),
                node: owned(node),
                fex: None,
                module: owned(module),
                port: owned(port),
            }),
            [pod, node, fex, module, port] => Ok(Self {
                if_type: if_type.to_owned(),
                pod: owned(pod),
                node: owned(node),
                fex: Some(owned(fex)),
                module: owned(module),
                port: owned(port),
            }),
            _ => Err(malformed(name)),
        }
    }

    /// Port id as the node names it (`eth1/12`, `eth101/1/12` on a FEX).
    pub fn port_id(&self) -> String {
        match &self.fex {
            Some(fex) => format!("{}{fex}/{}/{}", self.if_type, self.module, self.port),
            None => format!("{}{}/{}", self.if_type, self.module, self.port),
        }
    }

    /// Parse an inventory DN (`topology/pod-1/node-103/sys/phys-[eth1/12]`)
    /// or a path DN (`topology/pod-1/paths-103/pathep-[eth1/12]`, with an
    /// optional `extpaths-F` segment).
    pub fn from_dn(dn_str: &str) -> Result<Self, CoreError> {
        let bad = || CoreError::invalid_argument(format!("not an interface DN: `{dn_str}`"));
        let rns = dn::split_rns(dn_str);
        let (pod, node, fex, port_rn) = match rns.as_slice() {
            ["topology", pod, node, "sys", port] => (pod, node.strip_prefix("node-"), None, port),
            ["topology", pod, node, port] => (pod, node.strip_prefix("paths-"), None, port),
            ["topology", pod, node, fex, port] => (
                pod,
                node.strip_prefix("paths-"),
                Some(fex.strip_prefix("extpaths-").ok_or_else(bad)?),
                port,
            ),
            _ => return Err(bad()),
        };
        let pod = pod.strip_prefix("pod-").ok_or_else(bad)?;
        let node = node.ok_or_else(bad)?;
        let port_id = port_rn
            .strip_prefix("phys-[")
            .or_else(|| port_rn.strip_prefix("pathep-["))
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(bad)?;

        let (if_type, numbers) = split_name(port_id).map_err(|_| bad())?;
        let (fex, module, port) = match (numbers.as_slice(), fex) {
            ([module, port], fex) => (fex.map(str::to_owned), *module, *port),
            ([fex, module, port], None) => (Some((*fex).to_owned()), *module, *port),
            _ => return Err(bad()),
        };
        Ok(Self {
            if_type: if_type.to_owned(),
            pod: pod.to_owned(),
            node: node.to_owned(),
            fex,
            module: module.to_owned(),
            port: port.to_owned(),
        })
    }
}

impl fmt::Display for PhysicalInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.if_type, self.pod, self.node)?;
        if let Some(fex) = &self.fex {
            write!(f, "/{fex}")?;
        }
        write!(f, "/{}/{}", self.module, self.port)
    }
}

impl FromStr for PhysicalInterface {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl InterfaceCapabilities for PhysicalInterface {
    fn is_ethernet(&self) -> bool {
        self.if_type == "eth"
    }

    fn is_fex(&self) -> bool {
        self.fex.is_some()
    }

    fn path(&self) -> Result<String, CoreError> {
        let port = format!("{}{}/{}", self.if_type, self.module, self.port);
        Ok(match &self.fex {
            Some(fex) => format!(
                "topology/pod-{}/paths-{}/extpaths-{fex}/pathep-[{port}]",
                self.pod, self.node
            ),
            None => format!("topology/pod-{}/paths-{}/pathep-[{port}]", self.pod, self.node),
        })
    }
}

// ── Port channels ────────────────────────────────────────────────────

/// A port channel, or a virtual port channel when members span two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortChannel {
    /// Interface policy group name.
    pub name: String,
    pub members: Vec<PhysicalInterface>,
}

impl PortChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn attach(&mut self, member: PhysicalInterface) {
        if !self.members.contains(&member) {
            self.members.push(member);
        }
    }

    pub fn detach(&mut self, member: &PhysicalInterface) {
        self.members.retain(|m| m != member);
    }

    /// Distinct member nodes in numeric order.
    pub fn nodes(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = self.members.iter().map(|m| m.node.as_str()).collect();
        nodes.sort_by_key(|n| (n.len(), *n));
        nodes.dedup();
        nodes
    }
}

impl InterfaceCapabilities for PortChannel {
    fn is_port_channel(&self) -> bool {
        true
    }

    fn is_vpc(&self) -> bool {
        self.nodes().len() > 1
    }

    fn path(&self) -> Result<String, CoreError> {
        let first = self.members.first().ok_or_else(|| {
            CoreError::invalid_structure(format!("port channel `{}` has no members", self.name))
        })?;
        let nodes = self.nodes();
        match nodes.as_slice() {
            [node] => Ok(format!(
                "topology/pod-{}/paths-{node}/pathep-[{}]",
                first.pod, self.name
            )),
            [a, b] => Ok(format!(
                "topology/pod-{}/protpaths-{a}-{b}/pathep-[{}]",
                first.pod, self.name
            )),
            _ => Err(CoreError::invalid_structure(format!(
                "virtual port channel `{}` spans {} nodes, at most 2 allowed",
                self.name,
                nodes.len()
            ))),
        }
    }
}

// ── Logical interfaces ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LogicalKind {
    Tunnel,
    Svi,
    Loopback,
    #[strum(serialize = "mgmt")]
    Management,
}

/// Interfaces without a leaf-port path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalInterface {
    pub kind: LogicalKind,
    pub id: String,
}

impl InterfaceCapabilities for LogicalInterface {
    fn path(&self) -> Result<String, CoreError> {
        Err(CoreError::invalid_structure(format!(
            "{} {} cannot be bound to an EPG",
            self.kind, self.id
        )))
    }
}

// ── Encapsulation ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encap {
    Vlan(u16),
    Vxlan(u32),
    Nvgre(u32),
}

const MAX_VLAN: u16 = 4094;
const MAX_VNID: u32 = 16_777_215;

impl Encap {
    pub fn validate(self) -> Result<Self, CoreError> {
        let ok = match self {
            Self::Vlan(id) => (1..=MAX_VLAN).contains(&id),
            Self::Vxlan(id) | Self::Nvgre(id) => (1..=MAX_VNID).contains(&id),
        };
        if ok {
            Ok(self)
        } else {
            Err(CoreError::invalid_argument(format!("encapsulation {self} out of range")))
        }
    }
}

impl fmt::Display for Encap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vlan(id) => write!(f, "vlan-{id}"),
            Self::Vxlan(id) => write!(f, "vxlan-{id}"),
            Self::Nvgre(id) => write!(f, "nvgre-{id}"),
        }
    }
}

impl FromStr for Encap {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CoreError::invalid_argument(format!("invalid encapsulation `{s}`"));
        let (kind, id) = s.split_once('-').ok_or_else(bad)?;
        let encap = match kind {
            "vlan" => Self::Vlan(id.parse().map_err(|_| bad())?),
            "vxlan" => Self::Vxlan(id.parse().map_err(|_| bad())?),
            "nvgre" => Self::Nvgre(id.parse().map_err(|_| bad())?),
            _ => return Err(bad()),
        };
        encap.validate()
    }
}

/// How an EPG's traffic is tagged on a bound port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum BindingMode {
    #[default]
    Regular,
    Untagged,
    Native,
}
