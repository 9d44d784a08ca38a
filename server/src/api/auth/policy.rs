//! Reloadable authorization policy
//!
//! Everything that can change on a configuration reload lives in one
//! immutable [`AuthPolicy`]. Requests clone the current `Arc` once and use
//! that snapshot throughout, so a reload never mixes old and new rules
//! within a single request.

use std::sync::Arc;

use parking_lot::RwLock;

use super::api_key::{ApiKeyConfigError, ApiKeyGate};
use super::endpoint::EndpointAuthorizationMatrix;
use crate::core::config::AppConfig;
use crate::domain::rbac::{Audited, ResourceRbacEvaluator};

#[derive(Debug)]
pub struct AuthPolicy {
    gate: ApiKeyGate,
    matrix: EndpointAuthorizationMatrix,
    rbac: Audited<ResourceRbacEvaluator>,
    debug: bool,
}

impl AuthPolicy {
    pub fn new(
        gate: ApiKeyGate,
        matrix: EndpointAuthorizationMatrix,
        rbac: ResourceRbacEvaluator,
        debug: bool,
    ) -> Self {
        Self {
            gate,
            matrix,
            rbac: Audited::new(rbac),
            debug,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ApiKeyConfigError> {
        let gate = ApiKeyGate::from_config(&config.api_keys)?;
        let matrix = EndpointAuthorizationMatrix::from_config(
            &config.endpoints,
            &config.identity.tenant_overrides,
        );
        let rbac = ResourceRbacEvaluator::new(
            Arc::new(config.rbac.catalog()),
            config.rbac.default_role.clone(),
        );
        Ok(Self::new(gate, matrix, rbac, config.debug))
    }

    pub fn gate(&self) -> &ApiKeyGate {
        &self.gate
    }

    pub fn matrix(&self) -> &EndpointAuthorizationMatrix {
        &self.matrix
    }

    /// Resource-level decisions, audited
    pub fn rbac(&self) -> &Audited<ResourceRbacEvaluator> {
        &self.rbac
    }

    /// Log allowed decisions too, not just denials
    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Shared handle to the active policy
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<Arc<AuthPolicy>>>,
}

impl PolicyHandle {
    pub fn new(policy: AuthPolicy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(policy))),
        }
    }

    /// Snapshot of the active policy
    pub fn current(&self) -> Arc<AuthPolicy> {
        self.inner.read().clone()
    }

    /// Replace the active policy; in-flight requests keep their snapshot
    pub fn replace(&self, policy: AuthPolicy) {
        *self.inner.write() = Arc::new(policy);
    }
}
