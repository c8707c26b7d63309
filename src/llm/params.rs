//! Per-user generation parameters

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const DEFAULT_MODEL: &str = "chatgpt-4o-latest";
pub const DEFAULT_TEMPERATURE: f64 = 0.83;
pub const DEFAULT_MAX_TOKENS: u32 = 1096;
pub const DEFAULT_FREQUENCY_PENALTY: f64 = 0.6;
pub const DEFAULT_TOP_P: f64 = 0.99;

/// Accepted temperature range (inclusive)
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);

/// Generation parameters sent with every completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub top_p: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: false,
            presence_penalty: 0.0,
            frequency_penalty: DEFAULT_FREQUENCY_PENALTY,
            top_p: DEFAULT_TOP_P,
        }
    }
}

/// Per-user parameter records, created from the defaults on first use
pub struct ParamsStore {
    defaults: GenerationParams,
    params: RwLock<HashMap<String, GenerationParams>>,
}

impl ParamsStore {
    pub fn new(defaults: GenerationParams) -> Self {
        Self {
            defaults,
            params: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn defaults(&self) -> &GenerationParams {
        &self.defaults
    }

    /// Current parameters for a user
    pub async fn get(&self, user_id: &str) -> GenerationParams {
        self.params
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }

    async fn update<R>(&self, user_id: &str, f: impl FnOnce(&mut GenerationParams) -> R) -> R {
        let mut params = self.params.write().await;
        let entry = params
            .entry(user_id.to_string())
            .or_insert_with(|| self.defaults.clone());
        f(entry)
    }

    pub async fn switch_model(&self, user_id: &str, model: &str) {
        self.update(user_id, |p| p.model = model.to_string()).await;
    }

    /// Set the temperature. The caller validates the range.
    pub async fn set_temperature(&self, user_id: &str, temperature: f64) {
        self.update(user_id, |p| p.temperature = temperature).await;
    }

    /// Flip the stream flag and return the new value
    pub async fn toggle_stream(&self, user_id: &str) -> bool {
        self.update(user_id, |p| {
            p.stream = !p.stream;
            p.stream
        })
        .await
    }
}

impl Default for ParamsStore {
    fn default() -> Self {
        Self::new(GenerationParams::default())
    }
}

pub fn temperature_in_range(value: f64) -> bool {
    value.is_finite() && (TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1).contains(&value)
}
