use std::collections::BTreeMap;

use super::{BridgeDomainId, ContextId, Handle, OutsideL3Id, SubnetId, TenantId};
use crate::error::CoreError;
use crate::graph::{MoGraph, RelationKind, RelationTarget};

impl MoGraph {
    pub fn bridge_domain(&mut self, tenant: TenantId, name: &str) -> Result<BridgeDomainId, CoreError> {
        self.create(tenant, name)
    }

    /// Add a subnet with gateway address `addr` (`10.1.1.1/24`).
    pub fn add_subnet(&mut self, bd: BridgeDomainId, name: &str, addr: &str) -> Result<SubnetId, CoreError> {
        if addr.is_empty() {
            return Err(CoreError::invalid_structure(format!(
                "subnet `{name}` needs an address"
            )));
        }
        if !addr.contains('/') {
            return Err(CoreError::invalid_argument(format!(
                "subnet address `{addr}` needs a prefix length"
            )));
        }
        self.create_keyed(bd, name, addr)
    }

    /// Mark a subnet deleted; the next push removes it from the controller.
    pub fn remove_subnet(&mut self, bd: BridgeDomainId, subnet: SubnetId) -> Result<(), CoreError> {
        if self.parent(subnet.id()) != Some(bd.id()) {
            return Err(CoreError::NotFound {
                class: "fvSubnet".into(),
                name: self.dn(subnet.id()).to_owned(),
            });
        }
        self.mark_deleted(subnet.id());
        Ok(())
    }

    /// Subnets not marked deleted.
    pub fn subnets(&self, bd: BridgeDomainId) -> Vec<SubnetId> {
        self.children_as::<SubnetId>(bd)
            .into_iter()
            .filter(|s| !self.is_deleted(s.id()))
            .collect()
    }

    /// Gateway address of a subnet.
    pub fn subnet_addr(&self, subnet: SubnetId) -> &str {
        self.node(subnet.id()).key()
    }

    /// Set the subnet scope from `private`, `public` and `shared`.
    pub fn set_subnet_scope(&mut self, subnet: SubnetId, scope: &[&str]) -> Result<(), CoreError> {
        self.set_attribute(subnet.id(), "scope", &scope.join(","))
    }

    pub fn set_context(&mut self, bd: BridgeDomainId, context: ContextId) -> Result<(), CoreError> {
        self.attach(
            bd.id(),
            RelationKind::Context,
            RelationTarget::Object(context.id()),
            BTreeMap::new(),
        )
    }

    pub fn context_of(&self, bd: BridgeDomainId) -> Option<ContextId> {
        self.related_objects(bd.id(), RelationKind::Context)
            .into_iter()
            .find_map(|id| self.handle(id))
    }

    /// Advertise the bridge domain's subnets through an L3 outside.
    pub fn add_l3out(&mut self, bd: BridgeDomainId, out: OutsideL3Id) -> Result<(), CoreError> {
        self.attach(
            bd.id(),
            RelationKind::BdOutside,
            RelationTarget::Object(out.id()),
            BTreeMap::new(),
        )
    }

    pub fn l3outs(&self, bd: BridgeDomainId) -> Vec<OutsideL3Id> {
        self.related_objects(bd.id(), RelationKind::BdOutside)
            .into_iter()
            .filter_map(|id| self.handle(id))
            .collect()
    }

    pub fn set_arp_flood(&mut self, bd: BridgeDomainId, on: bool) -> Result<(), CoreError> {
        self.yes_no(bd, "arpFlood", on)
    }

    pub fn set_unicast_route(&mut self, bd: BridgeDomainId, on: bool) -> Result<(), CoreError> {
        self.yes_no(bd, "unicastRoute", on)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::wire::emit;

    #[test]
    fn subnet_needs_address() {
        let mut g = MoGraph::new();
        let t = g.tenant("t").unwrap();
        let bd = g.bridge_domain(t, "bd").unwrap();
        assert!(matches!(
            g.add_subnet(bd, "s", ""),
            Err(CoreError::InvalidStructure { .. })
        ));
        let s = g.add_subnet(bd, "s", "10.0.0.1/24").unwrap();
        assert_eq!(g.subnet_addr(s), "10.0.0.1/24");
        assert_eq!(g.subnets(bd), vec![s]);
    }

    #[test]
    fn remove_subnet_tombstones_it() {
        let mut g = MoGraph::new();
        let t = g.tenant("t").unwrap();
        let bd = g.bridge_domain(t, "bd").unwrap();
        let s = g.add_subnet(bd, "s", "10.0.0.1/24").unwrap();
        g.remove_subnet(bd, s).unwrap();
        assert!(g.subnets(bd).is_empty());
        assert_eq!(
            emit(&g, bd.id()),
            json!({ "fvBD": { "attributes": { "name": "bd" }, "children": [
                { "fvSubnet": { "attributes": { "name": "s", "ip": "10.0.0.1/24", "status": "deleted" } } }
            ] } })
        );
    }

    #[test]
    fn value_sets_are_enforced() {
        let mut g = MoGraph::new();
        let t = g.tenant("t").unwrap();
        let bd = g.bridge_domain(t, "bd").unwrap();
        assert!(g.set_attribute(bd.id(), "unkMcastAct", "opt-flood").is_ok());
        assert!(matches!(
            g.set_attribute(bd.id(), "unkMcastAct", "sometimes"),
            Err(CoreError::InvalidArgument { .. })
        ));
        g.set_arp_flood(bd, true).unwrap();
        assert_eq!(g.attribute(bd.id(), "arpFlood"), Some("yes"));
    }
}
