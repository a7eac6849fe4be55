use super::{AppProfileId, ContextId, Handle, TenantId};
use crate::error::CoreError;
use crate::graph::{MoGraph, MoId};
use crate::registry::MoClass;

impl MoGraph {
    pub fn tenant(&mut self, name: &str) -> Result<TenantId, CoreError> {
        self.add_root(MoClass::Tenant, name).map(TenantId::wrap)
    }

    pub fn find_tenant(&self, name: &str) -> Option<TenantId> {
        self.lookup(&format!("uni/tn-{name}"))
    }

    /// The tenant an object lives in.
    pub fn tenant_of(&self, id: impl Into<MoId>) -> Option<TenantId> {
        self.ancestor_of_class(id.into(), MoClass::Tenant)
            .map(TenantId::wrap)
    }

    pub fn app_profile(&mut self, tenant: TenantId, name: &str) -> Result<AppProfileId, CoreError> {
        self.create(tenant, name)
    }

    pub fn context(&mut self, tenant: TenantId, name: &str) -> Result<ContextId, CoreError> {
        self.create(tenant, name)
    }

    /// `true` turns policy enforcement off for the whole context.
    pub fn set_allow_all(&mut self, context: ContextId, allow: bool) -> Result<(), CoreError> {
        let value = if allow { "unenforced" } else { "enforced" };
        self.set_attribute(context.id(), "pcEnfPref", value)
    }

    pub fn allow_all(&self, context: ContextId) -> bool {
        self.attribute(context.id(), "pcEnfPref") == Some("unenforced")
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::MoGraph;

    #[test]
    fn allow_all_maps_to_enforcement() {
        let mut g = MoGraph::new();
        let t = g.tenant("t").unwrap();
        let ctx = g.context(t, "vrf").unwrap();
        assert!(!g.allow_all(ctx));
        g.set_allow_all(ctx, true).unwrap();
        assert!(g.allow_all(ctx));
        assert_eq!(g.find_tenant("t"), Some(t));
        assert_eq!(g.tenant_of(ctx), Some(t));
    }
}
