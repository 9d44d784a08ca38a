//! Fine-grained, per-resource role-based access control
//!
//! - `catalog` - role name -> permissions, plus the admin role
//! - `security` - per-resource default role and ACL
//! - `evaluator` - owner/admin/role decisions and ACL mutations
//! - `audit` - decision audit decorator
//! - `store` - in-memory per-resource security registry

mod audit;
mod catalog;
mod evaluator;
mod security;
mod store;

pub use audit::Audited;
pub use catalog::RoleCatalog;
pub use evaluator::{RbacError, ResourceAuthorizer, ResourceRbacEvaluator};
pub use security::{RbacAccessControl, ResourceSecurity};
pub use store::ResourceSecurityStore;
