//! Crate-wide error type. Every variant carries enough context to
//! log at the point of origin before propagating; transport/tool failures
//! convert in via `From`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Domain(#[from] conductor_domain::error::Error),

    #[error("tool transport failure: {0}")]
    Transport(String),

    #[error("model call deadline exceeded after {0}ms")]
    ModelDeadline(u64),

    #[error("tool call deadline exceeded after {0}ms")]
    ToolDeadline(u64),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("workflow invariant violation: {0}")]
    WorkflowInvariant(String),

    #[error("iteration cap reached")]
    IterationCapReached,
}

impl From<conductor_mcp_client::McpError> for OrchestratorError {
    fn from(e: conductor_mcp_client::McpError) -> Self {
        OrchestratorError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
