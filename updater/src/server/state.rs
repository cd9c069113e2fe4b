//! Server state

use crate::deploy::UpdateOrchestrator;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: UpdateOrchestrator,
    /// Upper bound for `GET /history?limit=`
    pub max_history: usize,
}

impl ServerState {
    pub fn new(orchestrator: UpdateOrchestrator, max_history: usize) -> Self {
        Self {
            orchestrator,
            max_history,
        }
    }
}
