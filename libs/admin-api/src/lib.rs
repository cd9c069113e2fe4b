//! Admin API models
//!
//! Shared between the updater's HTTP handlers and anything that consumes
//! them (the appliance admin UI, the CLI status printer).

pub mod models;

pub use models::*;
