// ── Typed object model ──
//
// Thin typed handles over `MoGraph` ids. Each handle pins an object's
// class so operations like `provide` or `add_subnet` only accept the
// right kinds of object; the graph keeps the data.

mod bridge_domain;
mod contract;
mod epg;
mod outside;
mod physical;
mod tenant;

use crate::error::CoreError;
use crate::graph::{MoGraph, MoId};
use crate::registry::MoClass;

pub use contract::ContractScope;
pub use epg::{ContractParty, StaticBinding};
pub use physical::NodeRole;

/// A class-checked view of a graph object.
pub trait Handle: Copy {
    const CLASS: MoClass;

    fn id(self) -> MoId;

    #[doc(hidden)]
    fn wrap(id: MoId) -> Self;
}

macro_rules! handle {
    ($($(#[$meta:meta])* $name:ident => $class:ident;)+) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(MoId);

        impl Handle for $name {
            const CLASS: MoClass = MoClass::$class;

            fn id(self) -> MoId {
                self.0
            }

            fn wrap(id: MoId) -> Self {
                Self(id)
            }
        }

        impl From<$name> for MoId {
            fn from(h: $name) -> MoId {
                h.0
            }
        }
    )+};
}

handle! {
    TenantId => Tenant;
    AppProfileId => AppProfile;
    /// Endpoint group.
    EpgId => Epg;
    BridgeDomainId => BridgeDomain;
    SubnetId => Subnet;
    /// VRF.
    ContextId => Context;
    ContractId => Contract;
    ContractSubjectId => ContractSubject;
    TabooId => Taboo;
    TabooSubjectId => TabooSubject;
    FilterId => Filter;
    FilterEntryId => FilterEntry;
    OutsideL3Id => OutsideL3;
    OutsideEpgId => OutsideEpg;
    OutsideNetworkId => OutsideNetwork;
    EndpointId => Endpoint;
    FabricId => Fabric;
    PodId => Pod;
    NodeId => Node;
    LinecardId => Linecard;
    SupervisorId => Supervisor;
    FantrayId => Fantray;
    PowerSupplyId => PowerSupply;
    InterfaceId => Interface;
}

impl MoGraph {
    /// Typed handle for `id`, or `None` when the class differs.
    pub fn handle<H: Handle>(&self, id: MoId) -> Option<H> {
        (self.class(id) == H::CLASS).then(|| H::wrap(id))
    }

    /// Typed handle for the object at `dn`.
    pub fn lookup<H: Handle>(&self, dn: &str) -> Option<H> {
        self.find_by_dn(dn).and_then(|id| self.handle(id))
    }

    /// Every live object of the handle's class.
    pub fn all<H: Handle>(&self) -> Vec<H> {
        self.of_class(H::CLASS).map(H::wrap).collect()
    }

    /// Typed children of `parent`.
    pub fn children_as<H: Handle>(&self, parent: impl Into<MoId>) -> Vec<H> {
        self.children_of_class(parent.into(), H::CLASS)
            .map(H::wrap)
            .collect()
    }

    fn create<H: Handle>(&mut self, parent: impl Into<MoId>, name: &str) -> Result<H, CoreError> {
        self.add_child(parent.into(), H::CLASS, name).map(H::wrap)
    }

    fn create_keyed<H: Handle>(
        &mut self,
        parent: impl Into<MoId>,
        name: &str,
        key: &str,
    ) -> Result<H, CoreError> {
        self.add_keyed(parent.into(), H::CLASS, name, key).map(H::wrap)
    }

    fn yes_no(&mut self, id: impl Into<MoId>, attr: &str, on: bool) -> Result<(), CoreError> {
        self.set_attribute(id.into(), attr, if on { "yes" } else { "no" })
    }
}
