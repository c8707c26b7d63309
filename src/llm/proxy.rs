//! `OpenAI`-compatible proxy client
//!
//! Speaks the chat-completions envelope to a single endpoint. The proxy
//! password goes into the `Authorization` header verbatim.

use super::types::{ChatMessage, CompletionRequest};
use super::{CompletionClient, LlmError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Completion client for a chat-completions proxy
pub struct ProxyClient {
    client: Client,
    url: String,
    password: String,
}

impl ProxyClient {
    pub fn new(
        url: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            password: password.into(),
        })
    }

    fn translate_request(request: &CompletionRequest) -> ProxyRequest<'_> {
        let params = &request.params;
        ProxyRequest {
            messages: &request.messages,
            model: &params.model,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: params.stream,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
            top_p: params.top_p,
        }
    }

    fn extract_reply(body: &str) -> Result<String, LlmError> {
        let response: ProxyResponse = serde_json::from_str(body)
            .map_err(|e| LlmError::provider(format!("Failed to parse response: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::provider("Invalid response format: no choices"))?;
        let message = choice
            .message
            .ok_or_else(|| LlmError::provider("Invalid choice format: no message"))?;
        message
            .content
            .ok_or_else(|| LlmError::provider("Invalid message format: no content"))
    }
}

#[async_trait]
impl CompletionClient for ProxyClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let payload = Self::translate_request(request);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", &self.password)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::transport(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::transport(format!("Connection failed: {e}"))
                } else {
                    LlmError::transport(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ProxyErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);
            return Err(
                LlmError::provider(format!("HTTP {status}: {message}")).with_status(status.as_u16())
            );
        }

        Self::extract_reply(&body)
    }
}

// Proxy wire types

#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    messages: &'a [ChatMessage],
    model: &'a str,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
    presence_penalty: f64,
    frequency_penalty: f64,
    top_p: f64,
}

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    choices: Vec<ProxyChoice>,
}

#[derive(Debug, Deserialize)]
struct ProxyChoice {
    #[serde(default)]
    message: Option<ProxyReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ProxyReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProxyErrorResponse {
    error: ProxyError,
}

#[derive(Debug, Deserialize)]
struct ProxyError {
    message: String,
}
