// ── Filter-entry ACL tuples ──
//
// The protocol match a filter entry encodes, and its dimension-wise
// intersection with another entry. `Any` is a wildcard in every
// dimension; port ranges intersect numerically.

use std::fmt;

use crate::error::CoreError;

/// A single dimension of a match: wildcard or one value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Match<T> {
    #[default]
    Any,
    Is(T),
}

impl<T: PartialEq + Clone> Match<T> {
    fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Any, x) | (x, Self::Any) => Some(x.clone()),
            (Self::Is(a), Self::Is(b)) => (a == b).then(|| self.clone()),
        }
    }

    fn contains(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Any, _) => true,
            (Self::Is(_), Self::Any) => false,
            (Self::Is(a), Self::Is(b)) => a == b,
        }
    }
}

impl Match<String> {
    fn from_attr(value: Option<&str>) -> Self {
        match value {
            None | Some("" | "unspecified" | "any" | "*") => Self::Any,
            Some(v) => Self::Is(v.to_owned()),
        }
    }

    fn to_attr(&self) -> String {
        match self {
            Self::Any => "unspecified".to_owned(),
            Self::Is(v) => v.clone(),
        }
    }
}

/// Inclusive layer-4 port range; `0..=65535` matches any port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub from: u16,
    pub to: u16,
}

/// Well-known port names the controller uses in place of numbers.
const NAMED_PORTS: &[(&str, u16)] = &[
    ("ftpData", 20),
    ("smtp", 25),
    ("dns", 53),
    ("http", 80),
    ("pop3", 110),
    ("https", 443),
    ("rtsp", 554),
];

impl PortRange {
    pub const ANY: Self = Self { from: 0, to: u16::MAX };

    pub fn new(from: u16, to: u16) -> Result<Self, CoreError> {
        if from > to {
            return Err(CoreError::invalid_argument(format!(
                "port range {from}-{to} is empty"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn single(port: u16) -> Self {
        Self { from: port, to: port }
    }

    pub fn is_any(self) -> bool {
        self == Self::ANY
    }

    fn intersect(self, other: Self) -> Option<Self> {
        let from = self.from.max(other.from);
        let to = self.to.min(other.to);
        (from <= to).then_some(Self { from, to })
    }

    fn contains(self, other: Self) -> bool {
        self.from <= other.from && other.to <= self.to
    }

    fn parse_port(value: &str) -> Result<Option<u16>, CoreError> {
        match value {
            "" | "unspecified" | "any" => Ok(None),
            "ftp-data" => Ok(Some(20)),
            v => {
                if let Some((_, port)) = NAMED_PORTS.iter().find(|(name, _)| *name == v) {
                    return Ok(Some(*port));
                }
                v.parse()
                    .map(Some)
                    .map_err(|_| CoreError::invalid_argument(format!("unrecognised port `{v}`")))
            }
        }
    }

    fn port_attr(port: u16) -> String {
        NAMED_PORTS
            .iter()
            .find(|(_, p)| *p == port)
            .map_or_else(|| port.to_string(), |(name, _)| (*name).to_owned())
    }

    /// Parse a `from`/`to` attribute pair. Unspecified ends are open;
    /// `0`/`0` is the controller's spelling of any.
    fn from_attrs(from: Option<&str>, to: Option<&str>) -> Result<Self, CoreError> {
        let from = Self::parse_port(from.unwrap_or_default())?;
        let to = Self::parse_port(to.unwrap_or_default())?;
        match (from, to) {
            (Some(0) | None, Some(0) | None) => Ok(Self::ANY),
            (f, t) => Self::new(f.unwrap_or(0), t.unwrap_or(u16::MAX)),
        }
    }

    fn to_attrs(self) -> (String, String) {
        if self.is_any() {
            ("unspecified".to_owned(), "unspecified".to_owned())
        } else {
            (Self::port_attr(self.from), Self::port_attr(self.to))
        }
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::ANY
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("any")
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

/// `(ethertype, protocol, src ports, dst ports, tcp flags, arp opcode,
/// icmp type, apply-to-fragment)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AclTuple {
    pub ethertype: Match<String>,
    pub protocol: Match<String>,
    pub src: PortRange,
    pub dst: PortRange,
    pub tcp_flags: Match<String>,
    pub arp_opcode: Match<String>,
    pub icmp_type: Match<String>,
    pub apply_to_frag: Match<bool>,
}

impl AclTuple {
    /// Matches everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Intersection of two tuples; `None` when any dimension is disjoint.
    pub fn overlap(&self, other: &Self) -> Option<Self> {
        Some(Self {
            ethertype: self.ethertype.intersect(&other.ethertype)?,
            protocol: self.protocol.intersect(&other.protocol)?,
            src: self.src.intersect(other.src)?,
            dst: self.dst.intersect(other.dst)?,
            tcp_flags: self.tcp_flags.intersect(&other.tcp_flags)?,
            arp_opcode: self.arp_opcode.intersect(&other.arp_opcode)?,
            icmp_type: self.icmp_type.intersect(&other.icmp_type)?,
            apply_to_frag: self.apply_to_frag.intersect(&other.apply_to_frag)?,
        })
    }

    /// `true` when every packet `other` matches is matched by `self`.
    pub fn contains(&self, other: &Self) -> bool {
        self.ethertype.contains(&other.ethertype)
            && self.protocol.contains(&other.protocol)
            && self.src.contains(other.src)
            && self.dst.contains(other.dst)
            && self.tcp_flags.contains(&other.tcp_flags)
            && self.arp_opcode.contains(&other.arp_opcode)
            && self.icmp_type.contains(&other.icmp_type)
            && self.apply_to_frag.contains(&other.apply_to_frag)
    }

    /// Filter-entry attributes for this tuple.
    pub fn to_attributes(&self) -> Vec<(&'static str, String)> {
        let (s_from, s_to) = self.src.to_attrs();
        let (d_from, d_to) = self.dst.to_attrs();
        vec![
            ("etherT", self.ethertype.to_attr()),
            ("prot", self.protocol.to_attr()),
            ("sFromPort", s_from),
            ("sToPort", s_to),
            ("dFromPort", d_from),
            ("dToPort", d_to),
            ("tcpRules", self.tcp_flags.to_attr()),
            ("arpOpc", self.arp_opcode.to_attr()),
            ("icmpv4T", self.icmp_type.to_attr()),
            (
                "applyToFrag",
                if self.apply_to_frag == Match::Is(true) { "yes" } else { "no" }.to_owned(),
            ),
        ]
    }

    /// Rebuild a tuple from filter-entry attributes.
    pub fn from_attributes<'a>(get: impl Fn(&str) -> Option<&'a str>) -> Result<Self, CoreError> {
        Ok(Self {
            ethertype: Match::from_attr(get("etherT")),
            protocol: Match::from_attr(get("prot")),
            src: PortRange::from_attrs(get("sFromPort"), get("sToPort"))?,
            dst: PortRange::from_attrs(get("dFromPort"), get("dToPort"))?,
            tcp_flags: Match::from_attr(get("tcpRules")),
            arp_opcode: Match::from_attr(get("arpOpc")),
            icmp_type: Match::from_attr(get("icmpv4T")),
            apply_to_frag: match get("applyToFrag") {
                Some("yes") => Match::Is(true),
                _ => Match::Any,
            },
        })
    }
}
