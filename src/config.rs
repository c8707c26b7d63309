//! Process configuration read from the environment

use crate::chat::DEFAULT_CONTEXT_TOKENS;
use crate::llm::{temperature_in_range, GenerationParams, DEFAULT_MODEL};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TEMPERATURE: f64 = 0.83;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Runtime settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Completion endpoint
    pub proxy_url: String,
    /// Sent verbatim as the `Authorization` header
    pub proxy_password: String,
    pub default_model: String,
    pub default_temperature: f64,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub session_timeout: Duration,
    pub sweep_interval: Duration,
    pub cooldown: Duration,
    /// Budget reported by the `memory` command
    pub context_tokens: usize,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Malformed numbers and out-of-range
    /// temperatures fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let proxy_url = lookup("PROXY_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("PROXY_URL"))?;

        let number = |key: &str, default: u64| parse_or(&lookup, key, default);

        Ok(Self {
            proxy_url,
            proxy_password: lookup("PROXY_PASSWORD").unwrap_or_default(),
            default_model: lookup("DEFAULT_MODEL")
                .filter(|model| !model.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            default_temperature: temperature_or_default(&lookup),
            max_tokens: parse_or(&lookup, "MAX_TOKENS", 1096),
            request_timeout: Duration::from_secs(number("REQUEST_TIMEOUT", 30)),
            session_timeout: Duration::from_secs(number("SESSION_TIMEOUT", 3600)),
            sweep_interval: Duration::from_secs(number("SWEEP_INTERVAL", 60).max(1)),
            cooldown: Duration::from_secs(number("COOLDOWN_SECS", 3)),
            context_tokens: parse_or(&lookup, "CONTEXT_TOKENS", DEFAULT_CONTEXT_TOKENS),
            port: parse_or(&lookup, "PERSONA_CHAT_PORT", 8000),
        })
    }

    /// Generation defaults handed to users who never changed them
    pub fn generation_defaults(&self) -> GenerationParams {
        GenerationParams {
            model: self.default_model.clone(),
            temperature: self.default_temperature,
            max_tokens: self.max_tokens,
            ..GenerationParams::default()
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring malformed setting");
            default
        }),
        None => default,
    }
}

fn temperature_or_default(lookup: &impl Fn(&str) -> Option<String>) -> f64 {
    let temperature = parse_or(lookup, "DEFAULT_TEMPERATURE", DEFAULT_TEMPERATURE);
    if temperature_in_range(temperature) {
        return temperature;
    }
    tracing::warn!(
        temperature,
        fallback = DEFAULT_TEMPERATURE,
        "DEFAULT_TEMPERATURE out of range"
    );
    DEFAULT_TEMPERATURE
}
