// Physical inventory: fabric -> pod -> node -> chassis parts -> interfaces.

use strum::{Display, EnumString};

use super::{FabricId, FantrayId, Handle, InterfaceId, LinecardId, NodeId, PodId, PowerSupplyId, SupervisorId};
use crate::error::CoreError;
use crate::graph::MoGraph;
use crate::interface::PhysicalInterface;
use crate::registry::MoClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum NodeRole {
    Controller,
    Leaf,
    Spine,
}

impl MoGraph {
    /// The `topology` root.
    pub fn fabric(&mut self) -> Result<FabricId, CoreError> {
        self.add_root(MoClass::Fabric, "fabric").map(FabricId::wrap)
    }

    pub fn pod(&mut self, fabric: FabricId, id: u32) -> Result<PodId, CoreError> {
        let key = id.to_string();
        self.create_keyed(fabric, &key, &key)
    }

    pub fn fabric_node(&mut self, pod: PodId, id: u32, role: NodeRole) -> Result<NodeId, CoreError> {
        let key = id.to_string();
        let node: NodeId = self.create_keyed(pod, &key, &key)?;
        self.set_attribute(node.id(), "role", &role.to_string())?;
        Ok(node)
    }

    pub fn node_role(&self, node: NodeId) -> Option<NodeRole> {
        self.attribute(node.id(), "role").and_then(|r| r.parse().ok())
    }

    pub fn linecard(&mut self, node: NodeId, slot: u32) -> Result<LinecardId, CoreError> {
        let key = slot.to_string();
        self.create_keyed(node, &key, &key)
    }

    pub fn supervisor(&mut self, node: NodeId, slot: u32) -> Result<SupervisorId, CoreError> {
        let key = slot.to_string();
        self.create_keyed(node, &key, &key)
    }

    pub fn fantray(&mut self, node: NodeId, slot: u32) -> Result<FantrayId, CoreError> {
        let key = slot.to_string();
        self.create_keyed(node, &key, &key)
    }

    pub fn power_supply(&mut self, node: NodeId, slot: u32) -> Result<PowerSupplyId, CoreError> {
        let key = slot.to_string();
        self.create_keyed(node, &key, &key)
    }

    /// Add an ethernet port to `node`, under its linecard when the module
    /// is present in the graph.
    pub fn interface(&mut self, node: NodeId, interface: &PhysicalInterface) -> Result<InterfaceId, CoreError> {
        let node_key = self.node(node.id()).key().to_owned();
        if interface.node != node_key {
            return Err(CoreError::invalid_argument(format!(
                "interface {interface} is on node {}, not {node_key}",
                interface.node
            )));
        }
        let id = interface.port_id();
        let parent = self.interface_parent(node.id(), &id);
        self.add_keyed(parent, MoClass::Interface, &id, &id)
            .map(InterfaceId::wrap)
    }

    /// Parsed identity of an interface object.
    pub fn physical_interface(&self, interface: InterfaceId) -> Result<PhysicalInterface, CoreError> {
        PhysicalInterface::from_dn(self.dn(interface.id()))
    }

    /// Interfaces on a node, including those under linecards.
    pub fn interfaces(&self, node: NodeId) -> Vec<InterfaceId> {
        self.descendants(node.id())
            .into_iter()
            .filter_map(|id| self.handle(id))
            .collect()
    }
}
