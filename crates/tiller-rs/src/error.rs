//! Error taxonomy shared by every layer of the agent.
//!
//! Tool handlers, the model client and the compactor all report failures as
//! an [`AgentError`]. The dispatcher never lets one escape: it folds tool
//! faults into an error [`ToolResult`](crate::tools::ToolResult) so the model
//! can see them. Network and protocol faults abort the current turn instead.

use thiserror::Error;

/// The error type for all agent operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// Malformed or missing tool arguments, or a path outside the workspace.
    #[error("validation error: {0}")]
    Validation(String),

    /// Filesystem or command execution failure.
    #[error("io error: {0}")]
    Io(String),

    /// Endpoint unreachable, timed out, or answered with a failure status.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed model response, unknown tool name, mismatched tool call id.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A session invariant was violated (e.g. compaction in the wrong state).
    #[error("state error: {0}")]
    State(String),
}

/// Result type alias using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Build an [`AgentError::Io`] from an I/O error with a short context.
    pub fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        AgentError::Io(format!("{context}: {err}"))
    }

    /// The message without the category prefix.
    ///
    /// This is the text shown to the model inside an error tool result.
    pub fn message(&self) -> &str {
        match self {
            AgentError::Validation(m)
            | AgentError::Io(m)
            | AgentError::Network(m)
            | AgentError::Protocol(m)
            | AgentError::State(m) => m,
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AgentError::Protocol(format!("failed to decode response: {e}"))
        } else if e.is_timeout() {
            AgentError::Network(format!("request timed out: {e}"))
        } else {
            AgentError::Network(format!("request failed: {e}"))
        }
    }
}
