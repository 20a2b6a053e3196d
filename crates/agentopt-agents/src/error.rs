use agentopt_cache::CacheError;
use thiserror::Error;

/// Errors produced by agents and the orchestrator.
///
/// `Clone` so a single in-flight outcome can be handed to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Fallback failed: {0}")]
    Fallback(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent {agent} does not support method {method}")]
    MethodNotFound { agent: String, method: String },

    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Agent disabled: {0}")]
    Disabled(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::InvalidRequest(e.to_string())
    }
}
