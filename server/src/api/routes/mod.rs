//! API route handlers

pub mod health;
pub mod me;
pub mod rbac;
