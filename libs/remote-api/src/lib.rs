//! Repository hosting API models
//!
//! Only the fields the updater reads are modelled; everything else in the
//! upstream payloads is ignored during deserialization.

pub mod models;

pub use models::*;
