use std::collections::BTreeMap;

use strum::{Display, EnumString};

use super::{
    ContractId, ContractSubjectId, FilterEntryId, FilterId, Handle, TabooId, TabooSubjectId, TenantId,
};
use crate::acl::AclTuple;
use crate::error::CoreError;
use crate::graph::{MoGraph, RelationKind, RelationTarget};

/// Where a contract applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ContractScope {
    #[default]
    Context,
    Global,
    Tenant,
    ApplicationProfile,
}

impl MoGraph {
    pub fn contract(&mut self, tenant: TenantId, name: &str) -> Result<ContractId, CoreError> {
        self.create(tenant, name)
    }

    pub fn set_scope(&mut self, contract: ContractId, scope: ContractScope) -> Result<(), CoreError> {
        self.set_attribute(contract.id(), "scope", &scope.to_string())
    }

    pub fn scope(&self, contract: ContractId) -> ContractScope {
        self.attribute(contract.id(), "scope")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn contract_subject(&mut self, contract: ContractId, name: &str) -> Result<ContractSubjectId, CoreError> {
        self.create(contract, name)
    }

    pub fn subject_filter(&mut self, subject: ContractSubjectId, filter: FilterId) -> Result<(), CoreError> {
        self.attach(
            subject.id(),
            RelationKind::SubjectFilter,
            RelationTarget::Object(filter.id()),
            BTreeMap::new(),
        )
    }

    pub fn taboo(&mut self, tenant: TenantId, name: &str) -> Result<TabooId, CoreError> {
        self.create(tenant, name)
    }

    pub fn taboo_subject(&mut self, taboo: TabooId, name: &str) -> Result<TabooSubjectId, CoreError> {
        self.create(taboo, name)
    }

    pub fn deny_filter(&mut self, subject: TabooSubjectId, filter: FilterId) -> Result<(), CoreError> {
        self.attach(
            subject.id(),
            RelationKind::DenyRule,
            RelationTarget::Object(filter.id()),
            BTreeMap::new(),
        )
    }

    pub fn subject_filters(&self, subject: ContractSubjectId) -> Vec<FilterId> {
        self.related_objects(subject.id(), RelationKind::SubjectFilter)
            .into_iter()
            .filter_map(|id| self.handle(id))
            .collect()
    }

    pub fn deny_filters(&self, subject: TabooSubjectId) -> Vec<FilterId> {
        self.related_objects(subject.id(), RelationKind::DenyRule)
            .into_iter()
            .filter_map(|id| self.handle(id))
            .collect()
    }

    pub fn filter(&mut self, tenant: TenantId, name: &str) -> Result<FilterId, CoreError> {
        self.create(tenant, name)
    }

    /// Add a filter entry matching `acl`.
    pub fn filter_entry(&mut self, filter: FilterId, name: &str, acl: &AclTuple) -> Result<FilterEntryId, CoreError> {
        let entry: FilterEntryId = self.create(filter, name)?;
        for (attr, value) in acl.to_attributes() {
            self.set_attribute(entry.id(), attr, &value)?;
        }
        Ok(entry)
    }

    /// The ACL tuple an entry encodes.
    pub fn acl(&self, entry: FilterEntryId) -> Result<AclTuple, CoreError> {
        AclTuple::from_attributes(|attr| self.attribute(entry.id(), attr))
    }

    pub fn filter_entries(&self, filter: FilterId) -> Vec<FilterEntryId> {
        self.children_as(filter)
    }
}
