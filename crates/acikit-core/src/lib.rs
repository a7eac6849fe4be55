//! Managed-object layer for the Cisco ACI controller, built on `acikit-api`.
//!
//! Configuration and inventory on the controller form one tree of managed
//! objects addressed by distinguished names. This crate models that tree:
//!
//! - **[`MoGraph`]**: Arena-allocated object graph. Parent links are ids,
//!   relations are separate edges that point at an object or, until it is
//!   loaded, at a DN. Objects are created through typed handles
//!   ([`TenantId`], [`EpgId`], ...) that pin their class.
//!
//! - **[`MoClass`]**: Static class registry: controller class name,
//!   parent classes, relative-name template and declared attribute value
//!   sets. DN and URL synthesis are pure functions of the graph.
//!
//! - **[`wire`]**: JSON emission for `push_to_apic` and ingestion of
//!   controller responses, hierarchical or flat.
//!
//! - **[`get_deep`]**: Loads a whole subtree with a single read and
//!   resolves references inside it. [`fetch_class`] loads one class.
//!
//! - **[`ClassEvents`]**: Class-level subscriptions yielding [`MoEvent`]s
//!   that [`MoGraph::apply_event`] folds back into a graph.
//!
//! - **[`FaultEvents`]**: Fault subscriptions and one-shot fault reads
//!   ([`fetch_faults`]), narrowed by a [`FaultFilter`].
//!
//! - **[`FakeController`]**: In-memory controller answering the same
//!   URLs, for offline tests.

pub mod acl;
pub mod deep;
pub mod dn;
pub mod error;
pub mod events;
pub mod fake;
pub mod faults;
pub mod fetch;
pub mod graph;
pub mod interface;
pub mod model;
pub mod registry;
pub mod wire;

// ── Primary re-exports ──────────────────────────────────────────────
pub use acl::{AclTuple, Match, PortRange};
pub use deep::{DeepOptions, DeepTree, get_deep, get_deep_tenant};
pub use error::CoreError;
pub use events::{ClassEvent, ClassEvents, EventStatus, MoEvent};
pub use fake::FakeController;
pub use faults::{
    Fault, FaultDomain, FaultEvent, FaultEvents, FaultFilter, FaultSeverity, FaultType, fetch_faults,
    fault_subscription_url,
};
pub use fetch::fetch_class;
pub use graph::{Lifecycle, MoGraph, MoId, MoNode, Relation, RelationKind, RelationStatus, RelationTarget};
pub use interface::{
    BindingMode, Encap, InterfaceCapabilities, LogicalInterface, LogicalKind, PhysicalInterface,
    PortChannel,
};
pub use model::{
    AppProfileId, BridgeDomainId, ContextId, ContractId, ContractParty, ContractScope,
    ContractSubjectId, EndpointId, EpgId, FabricId, FantrayId, FilterEntryId, FilterId, Handle,
    InterfaceId, LinecardId, NodeId, NodeRole, OutsideEpgId, OutsideL3Id, OutsideNetworkId, PodId,
    PowerSupplyId, StaticBinding, SubnetId, SupervisorId, TabooId, TabooSubjectId, TenantId,
};
pub use registry::{MoClass, class_of_dn};

pub use acikit_api as api;
pub use acikit_api::{ApicClient, Session, SessionConfig};
