//! vox-updater library
//!
//! Core modules for the Vox appliance self-updater.

pub mod app;
pub mod backup;
pub mod cli;
pub mod compat;
pub mod deploy;
pub mod detect;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod marker;
pub mod process;
pub mod remote;
pub mod server;
pub mod service;
pub mod storage;
pub mod utils;
pub mod workers;
