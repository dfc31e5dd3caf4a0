//! Tenant context model

use serde::{Deserialize, Serialize};

/// Active and previously remembered tenant (client organization) ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub current_tenant_id: Option<String>,
    /// Last tenant whose data the store is known to hold
    pub previous_tenant_id: Option<String>,
}

impl TenantContext {
    /// Whether switching to `tenant_id` requires wiping local data.
    pub fn requires_wipe_for(&self, tenant_id: &str) -> bool {
        self.previous_tenant_id
            .as_deref()
            .is_some_and(|previous| previous != tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wipe_required_only_for_a_different_known_tenant() {
        let fresh = TenantContext::default();
        assert!(!fresh.requires_wipe_for("acme"));

        let known = TenantContext {
            current_tenant_id: Some("acme".to_string()),
            previous_tenant_id: Some("acme".to_string()),
        };
        assert!(!known.requires_wipe_for("acme"));
        assert!(known.requires_wipe_for("globex"));
    }
}
