// ── Faults ──
//
// Fault instances (`faultInst`) and delegated faults (`faultDelegate`),
// read once through `ApicClient` or followed live through a `faultInfo`
// subscription. A `FaultFilter` narrows both by domain, severity, type or
// code.

use std::collections::BTreeMap;
use std::future::Future;

use acikit_api::{ApicClient, Query, QueryTarget, Session, SubscriptionEvent};
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::debug;

use crate::dn;
use crate::error::CoreError;
use crate::events::{EventStatus, MoEvent};

/// Abstract class covering both fault classes; subscriptions use it.
pub const FAULT_INFO_CLASS: &str = "faultInfo";
pub const FAULT_CLASSES: [&str; 2] = ["faultInst", "faultDelegate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FaultSeverity {
    Cleared,
    Info,
    Warning,
    Minor,
    Major,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FaultDomain {
    Infra,
    Tenant,
    Security,
    Management,
    Framework,
    External,
    Access,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FaultType {
    Config,
    Environmental,
    Communications,
    Operational,
}

// ── Filter ───────────────────────────────────────────────────────────

/// Which faults to read or follow. Empty lists do not constrain; values
/// within one list are alternatives, separate lists must all match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultFilter {
    pub domain: Vec<FaultDomain>,
    pub severity: Vec<FaultSeverity>,
    pub kind: Vec<FaultType>,
    pub code: Vec<String>,
}

impl FaultFilter {
    pub fn by_severity(severity: impl IntoIterator<Item = FaultSeverity>) -> Self {
        Self {
            severity: severity.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.domain.is_empty() && self.severity.is_empty() && self.kind.is_empty() && self.code.is_empty()
    }

    fn clauses(&self) -> Vec<(&'static str, Vec<String>)> {
        [
            ("domain", self.domain.iter().map(ToString::to_string).collect()),
            ("severity", self.severity.iter().map(ToString::to_string).collect()),
            ("type", self.kind.iter().map(ToString::to_string).collect()),
            ("code", self.code.clone()),
        ]
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .collect()
    }

    /// `query-target-filter` expression over `class`, or `None` when the
    /// filter is empty.
    pub fn expression(&self, class: &str) -> Option<String> {
        let terms: Vec<String> = self
            .clauses()
            .into_iter()
            .map(|(key, values)| {
                let eqs: Vec<String> = values.iter().map(|v| format!("eq({class}.{key},\"{v}\")")).collect();
                if eqs.len() == 1 {
                    eqs.concat()
                } else {
                    format!("or({})", eqs.join(","))
                }
            })
            .collect();
        match terms.len() {
            0 => None,
            1 => terms.into_iter().next(),
            _ => Some(format!("and({})", terms.join(","))),
        }
    }

    /// Client-side check. Fields a fault does not carry never match a
    /// constraint on them.
    pub fn matches(&self, fault: &Fault) -> bool {
        let has = |wanted: &[String], actual: Option<&str>| {
            wanted.is_empty() || actual.is_some_and(|a| wanted.iter().any(|w| w == a))
        };
        let domain: Vec<String> = self.domain.iter().map(ToString::to_string).collect();
        let kind: Vec<String> = self.kind.iter().map(ToString::to_string).collect();
        (self.severity.is_empty() || fault.severity.is_some_and(|s| self.severity.contains(&s)))
            && has(&domain, fault.attribute("domain"))
            && has(&kind, fault.attribute("type"))
            && has(&self.code, fault.code())
    }
}

/// Subscription URL for faults matching `filter`.
pub fn fault_subscription_url(filter: &FaultFilter) -> String {
    let query = Query::class(FAULT_INFO_CLASS);
    match filter.expression(FAULT_INFO_CLASS) {
        Some(expr) => query.filter(&expr).to_url(),
        None => query.to_url(),
    }
}

// ── Fault ────────────────────────────────────────────────────────────

/// One fault as reported by the controller.
///
/// Change events carry only the attributes that changed, so every
/// descriptive field is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    /// `faultInst` or `faultDelegate`.
    pub class: String,
    pub dn: String,
    pub status: EventStatus,
    pub severity: Option<FaultSeverity>,
    pub attributes: BTreeMap<String, String>,
    /// `lastTransition`, falling back to `created`.
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl Fault {
    pub fn from_item(value: &Value) -> Result<Self, CoreError> {
        let event = MoEvent::from_item(value)?;
        if !FAULT_CLASSES.contains(&event.class.as_str()) {
            return Err(CoreError::invalid_structure(format!("{} is not a fault class", event.class)));
        }
        let severity = match event.attribute("severity") {
            None | Some("") => None,
            Some(s) => Some(
                s.parse()
                    .map_err(|_| CoreError::invalid_structure(format!("unknown fault severity `{s}`")))?,
            ),
        };
        let timestamp = ["lastTransition", "created"]
            .iter()
            .find_map(|name| event.attribute(name).and_then(|ts| DateTime::parse_from_rfc3339(ts).ok()));
        Ok(Self {
            class: event.class,
            dn: event.dn,
            status: event.status,
            severity,
            attributes: event.attributes,
            timestamp,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn code(&self) -> Option<&str> {
        self.attribute("code")
    }

    pub fn description(&self) -> Option<&str> {
        self.attribute("descr")
    }

    /// DN of the object the fault is raised on: the `affected` attribute
    /// of a delegate, the parent of a fault instance.
    pub fn affected_dn(&self) -> &str {
        match self.attribute("affected") {
            Some(affected) if self.class == "faultDelegate" && !affected.is_empty() => affected,
            _ => dn::parent_dn(&self.dn).unwrap_or(&self.dn),
        }
    }

    /// `true` if the affected object lives in tenant `name`.
    pub fn in_tenant(&self, name: &str) -> bool {
        let tenant = format!("uni/tn-{name}");
        let affected = self.affected_dn();
        affected == tenant || dn::is_descendant(affected, &tenant)
    }

    pub fn is_cleared(&self) -> bool {
        self.severity == Some(FaultSeverity::Cleared) || self.status == EventStatus::Deleted
    }
}

// ── One-shot read ────────────────────────────────────────────────────

/// Read faults matching `filter`, fabric-wide or under `scope`.
///
/// Fabric-wide reads filter on the controller; scoped reads select both
/// fault classes in the subtree and filter here.
pub async fn fetch_faults(
    client: &impl ApicClient,
    filter: &FaultFilter,
    scope: Option<&str>,
) -> Result<Vec<Fault>, CoreError> {
    let urls: Vec<String> = match scope {
        Some(dn) => vec![
            Query::mo(dn)
                .query_target(QueryTarget::Subtree)
                .target_subtree_class(FAULT_CLASSES)
                .to_url(),
        ],
        None => FAULT_CLASSES
            .iter()
            .map(|class| {
                let query = Query::class(*class);
                match filter.expression(class) {
                    Some(expr) => query.filter(&expr).to_url(),
                    None => query.to_url(),
                }
            })
            .collect(),
    };

    let mut faults = Vec::new();
    for url in urls {
        let response = client.get(&url).await?;
        debug!(url = %url, count = response.imdata.len(), "fault read");
        for value in &response.imdata {
            let fault = Fault::from_item(value)?;
            if filter.matches(&fault) {
                faults.push(fault);
            }
        }
    }
    Ok(faults)
}

// ── Live faults ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FaultEvent {
    Fault(Fault),
    /// The subscription was rebuilt or overflowed; faults around this
    /// point may be missing.
    Reset,
}

impl TryFrom<SubscriptionEvent> for FaultEvent {
    type Error = CoreError;

    fn try_from(event: SubscriptionEvent) -> Result<Self, Self::Error> {
        match event {
            SubscriptionEvent::Snapshot(v) | SubscriptionEvent::Change(v) => Fault::from_item(&v).map(Self::Fault),
            SubscriptionEvent::Reset => Ok(Self::Reset),
        }
    }
}

/// Fault subscriptions on a session, keyed by filter.
pub trait FaultEvents {
    fn subscribe_faults(
        &self,
        filter: &FaultFilter,
        only_new: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn unsubscribe_faults(&self, filter: &FaultFilter) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn has_faults(&self, filter: &FaultFilter) -> bool;

    /// Drain every queued fault without waiting, keeping those in tenant
    /// `tenant` when given. Reset markers are skipped.
    fn get_faults(&self, filter: &FaultFilter, tenant: Option<&str>) -> Result<Vec<Fault>, CoreError>;

    fn next_fault(&self, filter: &FaultFilter) -> impl Future<Output = Result<FaultEvent, CoreError>> + Send;
}

impl FaultEvents for Session {
    async fn subscribe_faults(&self, filter: &FaultFilter, only_new: bool) -> Result<(), CoreError> {
        self.subscribe(&fault_subscription_url(filter), only_new).await?;
        Ok(())
    }

    async fn unsubscribe_faults(&self, filter: &FaultFilter) -> Result<(), CoreError> {
        self.unsubscribe(&fault_subscription_url(filter)).await?;
        Ok(())
    }

    fn has_faults(&self, filter: &FaultFilter) -> bool {
        self.has_events(&fault_subscription_url(filter))
    }

    fn get_faults(&self, filter: &FaultFilter, tenant: Option<&str>) -> Result<Vec<Fault>, CoreError> {
        let url = fault_subscription_url(filter);
        let mut faults = Vec::new();
        loop {
            let event = match self.get_event(&url) {
                Ok(event) => event,
                Err(acikit_api::Error::NoEvent { .. }) => break,
                Err(e) => return Err(e.into()),
            };
            match FaultEvent::try_from(event)? {
                FaultEvent::Fault(fault) if tenant.is_none_or(|t| fault.in_tenant(t)) => faults.push(fault),
                FaultEvent::Fault(_) => {}
                FaultEvent::Reset => debug!(url = %url, "fault subscription reset"),
            }
        }
        Ok(faults)
    }

    async fn next_fault(&self, filter: &FaultFilter) -> Result<FaultEvent, CoreError> {
        self.next_event(&fault_subscription_url(filter)).await?.try_into()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn inst(dn: &str, severity: &str, code: &str) -> Value {
        json!({"faultInst": {"attributes": {
            "dn": dn,
            "code": code,
            "severity": severity,
            "domain": "tenant",
            "type": "config",
            "descr": "Configuration failed",
            "created": "2016-04-27T15:24:27.364-07:00",
        }}})
    }

    #[test]
    fn empty_filter_subscribes_to_every_fault() {
        assert_eq!(fault_subscription_url(&FaultFilter::default()), "/api/class/faultInfo.json");
        assert!(FaultFilter::default().expression("faultInst").is_none());
    }

    #[test]
    fn filter_expression_nests_alternatives() {
        let filter = FaultFilter::by_severity([FaultSeverity::Major]);
        assert_eq!(
            filter.expression("faultInfo").unwrap(),
            r#"eq(faultInfo.severity,"major")"#
        );

        let filter = FaultFilter {
            domain: vec![FaultDomain::Tenant],
            severity: vec![FaultSeverity::Major, FaultSeverity::Critical],
            ..FaultFilter::default()
        };
        assert_eq!(
            filter.expression("faultInfo").unwrap(),
            r#"and(eq(faultInfo.domain,"tenant"),or(eq(faultInfo.severity,"major"),eq(faultInfo.severity,"critical")))"#
        );
    }

    #[test]
    fn decodes_fault_instance() {
        let fault = Fault::from_item(&inst("uni/tn-t1/BD-bd1/fault-F0956", "major", "F0956")).unwrap();
        assert_eq!(fault.severity, Some(FaultSeverity::Major));
        assert_eq!(fault.code(), Some("F0956"));
        assert_eq!(fault.affected_dn(), "uni/tn-t1/BD-bd1");
        assert!(fault.in_tenant("t1"));
        assert!(!fault.in_tenant("t"));
        assert_eq!(fault.timestamp.unwrap().timestamp(), 1_461_795_867);
        assert!(!fault.is_cleared());
    }

    #[test]
    fn delegate_points_at_affected_object() {
        let fault = Fault::from_item(&json!({"faultDelegate": {"attributes": {
            "dn": "uni/tn-common/fd-[uni/tn-t2/ctx-v1]-fault-F1234",
            "affected": "uni/tn-t2/ctx-v1",
            "severity": "cleared",
        }}}))
        .unwrap();
        assert_eq!(fault.affected_dn(), "uni/tn-t2/ctx-v1");
        assert!(fault.in_tenant("t2"));
        assert!(fault.is_cleared());
    }

    #[test]
    fn non_fault_items_are_rejected() {
        let err = Fault::from_item(&json!({"fvTenant": {"attributes": {"dn": "uni/tn-a"}}})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidStructure { .. }));
        let err = Fault::from_item(&inst("uni/tn-a/fault-F1", "dire", "F1")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidStructure { .. }));
    }

    #[test]
    fn filter_matches_client_side() {
        let fault = Fault::from_item(&inst("uni/tn-t1/fault-F1", "minor", "F1")).unwrap();
        assert!(FaultFilter::default().matches(&fault));
        assert!(FaultFilter::by_severity([FaultSeverity::Minor, FaultSeverity::Major]).matches(&fault));
        assert!(!FaultFilter::by_severity([FaultSeverity::Critical]).matches(&fault));
        let by_code = FaultFilter {
            code: vec!["F2".into()],
            ..FaultFilter::default()
        };
        assert!(!by_code.matches(&fault));
        let by_type = FaultFilter {
            kind: vec![FaultType::Config],
            domain: vec![FaultDomain::Tenant],
            ..FaultFilter::default()
        };
        assert!(by_type.matches(&fault));
    }
}
