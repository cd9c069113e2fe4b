//! Update pipeline

pub mod applier;
pub mod fsm;
pub mod orchestrator;
pub mod session;
pub mod staging;

pub use orchestrator::{OrchestratorParts, SessionStarted, StatusSnapshot, UpdateOrchestrator};
