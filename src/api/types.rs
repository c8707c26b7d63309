//! API request and response types

use serde::{Deserialize, Serialize};

/// Inbound chat message for a user
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
    #[serde(default)]
    pub reply_to_bot: bool,
    #[serde(default)]
    pub mentions_bot: bool,
}

/// New text for an edited message
#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub text: String,
}

/// Response for message deletion
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// Response for persona import
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
