//! Orchestrator errors

use crate::llm::LlmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The provider could not be reached (network failure, timeout)
    #[error("Could not reach the completion provider: {0}")]
    Transport(LlmError),
    /// The provider answered with an error or an unreadable body
    #[error("The completion provider returned an error: {0}")]
    Provider(LlmError),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("A reply is already being generated for this user")]
    Busy,
    #[error("The conversation changed while the reply was being generated")]
    Superseded,
    #[error("Export failed: {0}")]
    Export(#[from] serde_json::Error),
}

impl ChatError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Errors caused by the provider rather than by the request
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Provider(_))
    }
}

impl From<LlmError> for ChatError {
    fn from(error: LlmError) -> Self {
        if error.is_transport() {
            Self::Transport(error)
        } else {
            Self::Provider(error)
        }
    }
}
