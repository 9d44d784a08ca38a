//! Authentication and authorization gate for the platform API

pub mod api;
pub mod app;
pub mod core;
pub mod domain;
pub mod utils;
