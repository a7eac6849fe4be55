use std::collections::BTreeMap;

use super::{ContextId, Handle, OutsideEpgId, OutsideL3Id, OutsideNetworkId, TenantId};
use crate::error::CoreError;
use crate::graph::{MoGraph, RelationKind, RelationTarget};

impl MoGraph {
    pub fn outside_l3(&mut self, tenant: TenantId, name: &str) -> Result<OutsideL3Id, CoreError> {
        self.create(tenant, name)
    }

    /// VRF the outside routes into; replaces any previous one.
    pub fn set_l3_context(&mut self, out: OutsideL3Id, context: ContextId) -> Result<(), CoreError> {
        self.attach(
            out.id(),
            RelationKind::L3Context,
            RelationTarget::Object(context.id()),
            BTreeMap::new(),
        )
    }

    pub fn l3_context(&self, out: OutsideL3Id) -> Option<ContextId> {
        self.related_objects(out.id(), RelationKind::L3Context)
            .into_iter()
            .find_map(|id| self.handle(id))
    }

    pub fn outside_epg(&mut self, out: OutsideL3Id, name: &str) -> Result<OutsideEpgId, CoreError> {
        self.create(out, name)
    }

    /// External prefix classified into the outside EPG.
    pub fn outside_network(
        &mut self,
        epg: OutsideEpgId,
        name: &str,
        ip: &str,
    ) -> Result<OutsideNetworkId, CoreError> {
        if ip.is_empty() {
            return Err(CoreError::invalid_structure(format!(
                "outside network `{name}` needs an address"
            )));
        }
        self.create_keyed(epg, name, ip)
    }

    pub fn outside_networks(&self, epg: OutsideEpgId) -> Vec<OutsideNetworkId> {
        self.children_as(epg)
    }
}
