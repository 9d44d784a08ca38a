//! Authorization domain
//!
//! - `principal` - authenticated caller identity
//! - `rbac` - per-resource role-based access control

pub mod principal;
pub mod rbac;

pub use principal::{AuthSource, Principal};
