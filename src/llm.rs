//! Completion provider abstraction
//!
//! A stateless transport seam: hand over role-tagged messages plus the
//! user's generation parameters, get one reply or a typed failure back.

mod error;
mod params;
mod proxy;
mod types;

#[cfg(test)]
pub mod testing;

pub use error::LlmError;
pub use params::{temperature_in_range, GenerationParams, ParamsStore, DEFAULT_MODEL};
pub use proxy::ProxyClient;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for completion providers
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Perform exactly one completion round trip
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: CompletionClient + ?Sized> CompletionClient for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        (**self).complete(request).await
    }
}

/// Logging wrapper for completion clients
pub struct LoggingService {
    inner: Arc<dyn CompletionClient>,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn CompletionClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CompletionClient for LoggingService {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    user_id = %request.user_id,
                    model = %request.params.model,
                    messages = request.messages.len(),
                    duration_ms = %duration.as_millis(),
                    reply_chars = reply.chars().count(),
                    "Completion finished"
                );
            }
            Err(e) => {
                tracing::error!(
                    user_id = %request.user_id,
                    model = %request.params.model,
                    duration_ms = %duration.as_millis(),
                    kind = e.kind.as_str(),
                    status = ?e.status,
                    error = %e.message,
                    "Completion failed"
                );
            }
        }

        result
    }
}
