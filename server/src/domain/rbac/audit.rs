//! Audit decorator for resource authorization decisions

use crate::core::constants::AUDIT_TARGET;
use crate::domain::principal::Principal;

use super::evaluator::ResourceAuthorizer;
use super::security::ResourceSecurity;

/// Wraps a [`ResourceAuthorizer`] and emits one audit event per decision
#[derive(Debug, Clone)]
pub struct Audited<A> {
    inner: A,
}

impl<A: ResourceAuthorizer> Audited<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: ResourceAuthorizer> ResourceAuthorizer for Audited<A> {
    fn can_access(
        &self,
        principal: &Principal,
        resource: &ResourceSecurity,
        owner_id: &str,
        permission: &str,
    ) -> bool {
        let allowed = self
            .inner
            .can_access(principal, resource, owner_id, permission);
        if allowed {
            tracing::debug!(
                target: AUDIT_TARGET,
                principal = %principal.id(),
                source = %principal.source(),
                permission,
                "resource access granted"
            );
        } else {
            tracing::info!(
                target: AUDIT_TARGET,
                principal = %principal.id(),
                source = %principal.source(),
                permission,
                effective_role = %resource.effective_role(principal.id()),
                "resource access denied"
            );
        }
        allowed
    }
}
