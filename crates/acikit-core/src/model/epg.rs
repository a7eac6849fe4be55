use std::collections::BTreeMap;

use super::{AppProfileId, BridgeDomainId, ContractId, EndpointId, EpgId, Handle, OutsideEpgId, TabooId};
use crate::error::CoreError;
use crate::graph::{MoGraph, RelationKind, RelationTarget};
use crate::interface::{BindingMode, Encap, InterfaceCapabilities};

/// Objects that can provide and consume contracts.
pub trait ContractParty: Handle {}

impl ContractParty for EpgId {}
impl ContractParty for OutsideEpgId {}

/// A static path binding on an EPG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticBinding {
    /// Path DN (`topology/pod-1/paths-101/pathep-[eth1/1]`).
    pub path: String,
    pub encap: Option<Encap>,
    pub mode: BindingMode,
}

impl MoGraph {
    pub fn epg(&mut self, app: AppProfileId, name: &str) -> Result<EpgId, CoreError> {
        self.create(app, name)
    }

    /// Bind the EPG to a bridge domain, replacing any previous binding.
    pub fn set_bd(&mut self, epg: EpgId, bd: BridgeDomainId) -> Result<(), CoreError> {
        self.attach(
            epg.id(),
            RelationKind::BridgeDomain,
            RelationTarget::Object(bd.id()),
            BTreeMap::new(),
        )
    }

    /// The bridge domain the EPG is bound to, when it is in this graph.
    pub fn bd(&self, epg: EpgId) -> Option<BridgeDomainId> {
        self.related_objects(epg.id(), RelationKind::BridgeDomain)
            .into_iter()
            .find_map(|id| self.handle(id))
    }

    pub fn remove_bd(&mut self, epg: EpgId) {
        self.detach_all(epg.id(), RelationKind::BridgeDomain);
    }

    pub fn provide<P: ContractParty>(&mut self, party: P, contract: ContractId) -> Result<(), CoreError> {
        self.attach(
            party.id(),
            RelationKind::Provide,
            RelationTarget::Object(contract.id()),
            BTreeMap::new(),
        )
    }

    pub fn consume<P: ContractParty>(&mut self, party: P, contract: ContractId) -> Result<(), CoreError> {
        self.attach(
            party.id(),
            RelationKind::Consume,
            RelationTarget::Object(contract.id()),
            BTreeMap::new(),
        )
    }

    pub fn dont_provide<P: ContractParty>(&mut self, party: P, contract: ContractId) -> bool {
        let dn = self.dn(contract.id()).to_owned();
        self.detach(party.id(), RelationKind::Provide, &dn)
    }

    pub fn dont_consume<P: ContractParty>(&mut self, party: P, contract: ContractId) -> bool {
        let dn = self.dn(contract.id()).to_owned();
        self.detach(party.id(), RelationKind::Consume, &dn)
    }

    pub fn provides<P: ContractParty>(&self, party: P, contract: ContractId) -> bool {
        self.related_objects(party.id(), RelationKind::Provide)
            .contains(&contract.id())
    }

    pub fn consumes<P: ContractParty>(&self, party: P, contract: ContractId) -> bool {
        self.related_objects(party.id(), RelationKind::Consume)
            .contains(&contract.id())
    }

    /// Contracts provided by `party` that resolve in this graph.
    pub fn provided<P: ContractParty>(&self, party: P) -> Vec<ContractId> {
        self.related_objects(party.id(), RelationKind::Provide)
            .into_iter()
            .filter_map(|id| self.handle(id))
            .collect()
    }

    pub fn consumed<P: ContractParty>(&self, party: P) -> Vec<ContractId> {
        self.related_objects(party.id(), RelationKind::Consume)
            .into_iter()
            .filter_map(|id| self.handle(id))
            .collect()
    }

    pub fn protect(&mut self, epg: EpgId, taboo: TabooId) -> Result<(), CoreError> {
        self.attach(
            epg.id(),
            RelationKind::Protect,
            RelationTarget::Object(taboo.id()),
            BTreeMap::new(),
        )
    }

    pub fn dont_protect(&mut self, epg: EpgId, taboo: TabooId) -> bool {
        let dn = self.dn(taboo.id()).to_owned();
        self.detach(epg.id(), RelationKind::Protect, &dn)
    }

    pub fn is_protected_by(&self, epg: EpgId, taboo: TabooId) -> bool {
        self.related_objects(epg.id(), RelationKind::Protect)
            .contains(&taboo.id())
    }

    /// Bind the EPG to a leaf port with the given encapsulation.
    ///
    /// Rebinding the same path replaces the previous encapsulation. Fails
    /// with `InvalidStructure` for interfaces without a path (tunnels,
    /// loopbacks) or when another EPG already uses the same path and encap
    /// with a different mode.
    pub fn attach_path(
        &mut self,
        epg: EpgId,
        interface: &impl InterfaceCapabilities,
        encap: Encap,
        mode: BindingMode,
    ) -> Result<(), CoreError> {
        let path = interface.path()?;
        let encap = encap.validate()?;
        let mut attributes = BTreeMap::from([("encap".to_owned(), encap.to_string())]);
        if mode != BindingMode::Regular {
            attributes.insert("mode".to_owned(), mode.to_string());
        }
        self.attach(epg.id(), RelationKind::StaticPath, RelationTarget::Dn(path), attributes)
    }

    pub fn detach_path(&mut self, epg: EpgId, interface: &impl InterfaceCapabilities) -> Result<bool, CoreError> {
        let path = interface.path()?;
        Ok(self.detach(epg.id(), RelationKind::StaticPath, &path))
    }

    pub fn static_paths(&self, epg: EpgId) -> Vec<StaticBinding> {
        self.related(epg.id(), RelationKind::StaticPath)
            .map(|r| StaticBinding {
                path: self.target_dn(&r.target),
                encap: r.attributes.get("encap").and_then(|e| e.parse().ok()),
                mode: r
                    .attributes
                    .get("mode")
                    .and_then(|m| m.parse().ok())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Learned endpoint keyed by MAC address.
    pub fn endpoint(&mut self, epg: EpgId, mac: &str) -> Result<EndpointId, CoreError> {
        self.create_keyed(epg, mac, mac)
    }

    pub fn endpoints(&self, epg: EpgId) -> Vec<EndpointId> {
        self.children_as(epg)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::interface::PhysicalInterface;
    use crate::model::TenantId;
    use crate::wire::emit;

    fn setup() -> (MoGraph, TenantId, EpgId) {
        let mut g = MoGraph::new();
        let t = g.tenant("t").unwrap();
        let ap = g.app_profile(t, "app").unwrap();
        let epg = g.epg(ap, "web").unwrap();
        (g, t, epg)
    }

    #[test]
    fn provide_consume_and_withdraw() {
        let (mut g, t, epg) = setup();
        let c = g.contract(t, "http").unwrap();
        g.provide(epg, c).unwrap();
        g.consume(epg, c).unwrap();
        assert!(g.provides(epg, c));
        assert_eq!(g.consumed(epg), vec![c]);

        assert!(g.dont_provide(epg, c));
        assert!(!g.provides(epg, c));
        assert!(g.consumes(epg, c));
    }

    #[test]
    fn path_binding_is_replaced_per_path() {
        let (mut g, _, epg) = setup();
        let intf = PhysicalInterface::parse("eth 1/101/1/1").unwrap();
        g.attach_path(epg, &intf, Encap::Vlan(5), BindingMode::Regular).unwrap();
        g.attach_path(epg, &intf, Encap::Vlan(6), BindingMode::Untagged).unwrap();

        let paths = g.static_paths(epg);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].path, "topology/pod-1/paths-101/pathep-[eth1/1]");
        assert_eq!(paths[0].encap, Some(Encap::Vlan(6)));
        assert_eq!(paths[0].mode, BindingMode::Untagged);

        assert!(g.detach_path(epg, &intf).unwrap());
        assert!(g.static_paths(epg).is_empty());
        let json = emit(&g, epg.id());
        assert_eq!(
            json["fvAEPg"]["children"][0]["fvRsPathAtt"]["attributes"]["status"],
            "deleted"
        );
    }

    #[test]
    fn endpoints_are_keyed_by_mac() {
        let (mut g, _, epg) = setup();
        let ep = g.endpoint(epg, "00:11:22:33:44:55").unwrap();
        assert_eq!(
            g.dn(ep.id()),
            "uni/tn-t/ap-app/epg-web/cep-00:11:22:33:44:55"
        );
        assert_eq!(g.endpoints(epg), vec![ep]);
    }
}
