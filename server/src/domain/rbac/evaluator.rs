//! Per-resource access decisions
//!
//! Precedence: owner, then administrator (catalog admin authority or the
//! platform admin), then the principal's effective role on the resource.

use std::sync::Arc;

use thiserror::Error;

use super::catalog::RoleCatalog;
use super::security::ResourceSecurity;
use crate::domain::principal::Principal;

/// Resource-level RBAC failure, returned to the calling business operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RbacError {
    #[error("Permission '{permission}' denied on resource")]
    ResourcePermissionDenied { permission: String },

    #[error("Only the resource owner or an administrator may change its security")]
    PermissionDenied,

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("No access control entry for: {0}")]
    EntryNotFound(String),
}

/// Object-level authorization boundary for business collaborators
pub trait ResourceAuthorizer: Send + Sync {
    fn can_access(
        &self,
        principal: &Principal,
        resource: &ResourceSecurity,
        owner_id: &str,
        permission: &str,
    ) -> bool;

    /// Typed variant of [`ResourceAuthorizer::can_access`]
    fn check(
        &self,
        principal: &Principal,
        resource: &ResourceSecurity,
        owner_id: &str,
        permission: &str,
    ) -> Result<(), RbacError> {
        if self.can_access(principal, resource, owner_id, permission) {
            Ok(())
        } else {
            Err(RbacError::ResourcePermissionDenied {
                permission: permission.to_string(),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceRbacEvaluator {
    catalog: Arc<RoleCatalog>,
    default_role: String,
}

impl ResourceRbacEvaluator {
    pub fn new(catalog: Arc<RoleCatalog>, default_role: impl Into<String>) -> Self {
        Self {
            catalog,
            default_role: default_role.into(),
        }
    }

    pub fn catalog(&self) -> &RoleCatalog {
        &self.catalog
    }

    /// Security for a freshly created resource: the creator administers it
    pub fn init_security(&self, creator_id: &str) -> ResourceSecurity {
        ResourceSecurity::new(self.default_role.clone())
            .with_entry(creator_id, self.catalog.admin_role())
    }

    /// Owner or administrator of the resource
    fn is_privileged(&self, principal: &Principal, owner_id: &str) -> bool {
        principal.id() == owner_id
            || principal.is_platform_admin()
            || principal.has_authority(self.catalog.admin_role())
    }

    /// Effective role of `principal_id` on `resource`
    pub fn effective_role<'a>(&self, resource: &'a ResourceSecurity, principal_id: &str) -> &'a str {
        resource.effective_role(principal_id)
    }

    fn ensure_privileged(&self, principal: &Principal, owner_id: &str) -> Result<(), RbacError> {
        if self.is_privileged(principal, owner_id) {
            Ok(())
        } else {
            Err(RbacError::PermissionDenied)
        }
    }

    fn ensure_known(&self, role: &str) -> Result<(), RbacError> {
        if self.catalog.is_known(role) {
            Ok(())
        } else {
            Err(RbacError::UnknownRole(role.to_string()))
        }
    }

    /// Set the ACL entry for `principal_id`, replacing any existing one
    pub fn grant(
        &self,
        caller: &Principal,
        owner_id: &str,
        resource: &mut ResourceSecurity,
        principal_id: &str,
        role: &str,
    ) -> Result<(), RbacError> {
        self.ensure_privileged(caller, owner_id)?;
        self.ensure_known(role)?;
        resource.set_entry(principal_id, role);
        tracing::debug!(caller = %caller.id(), principal_id, role, "ACL entry granted");
        Ok(())
    }

    /// Remove the ACL entry for `principal_id`; the default role applies again
    pub fn revoke(
        &self,
        caller: &Principal,
        owner_id: &str,
        resource: &mut ResourceSecurity,
        principal_id: &str,
    ) -> Result<(), RbacError> {
        self.ensure_privileged(caller, owner_id)?;
        resource
            .remove_entry(principal_id)
            .ok_or_else(|| RbacError::EntryNotFound(principal_id.to_string()))?;
        tracing::debug!(caller = %caller.id(), principal_id, "ACL entry revoked");
        Ok(())
    }

    pub fn set_default(
        &self,
        caller: &Principal,
        owner_id: &str,
        resource: &mut ResourceSecurity,
        role: &str,
    ) -> Result<(), RbacError> {
        self.ensure_privileged(caller, owner_id)?;
        self.ensure_known(role)?;
        resource.default = role.to_string();
        tracing::debug!(caller = %caller.id(), role, "Default role changed");
        Ok(())
    }
}

impl ResourceAuthorizer for ResourceRbacEvaluator {
    fn can_access(
        &self,
        principal: &Principal,
        resource: &ResourceSecurity,
        owner_id: &str,
        permission: &str,
    ) -> bool {
        if self.is_privileged(principal, owner_id) {
            return true;
        }
        let role = resource.effective_role(principal.id());
        // Admin role is a structural bypass, independent of its listed permissions
        self.catalog.is_admin_role(role) || self.catalog.grants(role, permission)
    }
}
