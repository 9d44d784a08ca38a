//! In-memory registry of resource security descriptors
//!
//! The registry only holds data. Every decision and mutation takes the
//! evaluator of the caller's policy snapshot, so a reload changes registry
//! decisions at the same moment as every other decision.
//!
//! Mutations on one resource hold that record's map entry for their whole
//! duration, so concurrent grant/revoke/delete calls are applied one after
//! another and readers never observe a half-applied change.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::evaluator::{RbacError, ResourceAuthorizer, ResourceRbacEvaluator};
use super::security::ResourceSecurity;
use crate::domain::principal::Principal;

#[derive(Debug, Clone)]
struct StoredSecurity {
    owner_id: String,
    security: ResourceSecurity,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceSecurityStore {
    records: Arc<DashMap<String, StoredSecurity>>,
}

impl ResourceSecurityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new resource created by `creator`. Returns false if the id
    /// is already taken.
    pub fn create(
        &self,
        evaluator: &ResourceRbacEvaluator,
        resource_id: &str,
        creator: &Principal,
    ) -> bool {
        match self.records.entry(resource_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(StoredSecurity {
                    owner_id: creator.id().to_string(),
                    security: evaluator.init_security(creator.id()),
                });
                true
            }
        }
    }

    /// Snapshot of `(owner_id, security)`
    pub fn get(&self, resource_id: &str) -> Option<(String, ResourceSecurity)> {
        self.inspect(resource_id, |owner_id, security| {
            (owner_id.to_string(), security.clone())
        })
    }

    /// Run `f` against one consistent view of the record
    pub fn inspect<R>(
        &self,
        resource_id: &str,
        f: impl FnOnce(&str, &ResourceSecurity) -> R,
    ) -> Option<R> {
        self.records
            .get(resource_id)
            .map(|r| f(&r.owner_id, &r.security))
    }

    /// Unknown resources are never accessible
    pub fn can_access<A: ResourceAuthorizer>(
        &self,
        authorizer: &A,
        principal: &Principal,
        resource_id: &str,
        permission: &str,
    ) -> bool {
        self.inspect(resource_id, |owner_id, security| {
            authorizer.can_access(principal, security, owner_id, permission)
        })
        .unwrap_or(false)
    }

    /// Remove the resource if `principal` holds `permission` on it
    ///
    /// The check and the removal happen under the same entry lock.
    pub fn remove_checked<A: ResourceAuthorizer>(
        &self,
        authorizer: &A,
        principal: &Principal,
        resource_id: &str,
        permission: &str,
    ) -> Result<(), RbacError> {
        match self.records.entry(resource_id.to_string()) {
            Entry::Vacant(_) => Err(RbacError::EntryNotFound(resource_id.to_string())),
            Entry::Occupied(entry) => {
                let record = entry.get();
                authorizer.check(principal, &record.security, &record.owner_id, permission)?;
                entry.remove();
                Ok(())
            }
        }
    }

    fn mutate<F>(&self, resource_id: &str, f: F) -> Result<(), RbacError>
    where
        F: FnOnce(&str, &mut ResourceSecurity) -> Result<(), RbacError>,
    {
        let mut record = self
            .records
            .get_mut(resource_id)
            .ok_or_else(|| RbacError::EntryNotFound(resource_id.to_string()))?;
        let StoredSecurity { owner_id, security } = &mut *record;
        f(owner_id.as_str(), security)
    }

    pub fn grant(
        &self,
        evaluator: &ResourceRbacEvaluator,
        caller: &Principal,
        resource_id: &str,
        principal_id: &str,
        role: &str,
    ) -> Result<(), RbacError> {
        self.mutate(resource_id, |owner, security| {
            evaluator.grant(caller, owner, security, principal_id, role)
        })
    }

    pub fn revoke(
        &self,
        evaluator: &ResourceRbacEvaluator,
        caller: &Principal,
        resource_id: &str,
        principal_id: &str,
    ) -> Result<(), RbacError> {
        self.mutate(resource_id, |owner, security| {
            evaluator.revoke(caller, owner, security, principal_id)
        })
    }

    pub fn set_default(
        &self,
        evaluator: &ResourceRbacEvaluator,
        caller: &Principal,
        resource_id: &str,
        role: &str,
    ) -> Result<(), RbacError> {
        self.mutate(resource_id, |owner, security| {
            evaluator.set_default(caller, owner, security, role)
        })
    }
}
