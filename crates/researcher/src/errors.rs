use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Model backend failed: {0}")]
    ModelBackend(String),

    #[error("Model backend did not respond within {0:?}")]
    BackendTimeout(Duration),

    #[error("No final answer after {0} model turns")]
    LoopBudgetExceeded(usize),

    #[error("Unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
