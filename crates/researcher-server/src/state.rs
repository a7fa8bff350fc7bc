use researcher::agent::Agent;
use std::sync::Arc;

/// Shared application state
///
/// One agent, and with it one conversation store, serves every request.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }
}
