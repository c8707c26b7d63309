//! Per-user persona settings and the seed context built from them

mod context;

#[cfg(test)]
mod proptests;

pub use context::build_context;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum PersonaError {
    #[error("Invalid persona document: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Character and user settings for one user.
///
/// Changes only reach a conversation when it is next created or cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub description: String,
    pub personality: String,
    pub scenario: String,
    pub user_persona: String,
    pub first_message: String,
    pub authors_note: String,
    pub user_token: String,
    pub system_prompts: Vec<String>,
}

/// Fields accepted by `set-definitions`; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Definitions {
    pub description: Option<String>,
    pub personality: Option<String>,
    pub scenario: Option<String>,
}

/// Persona records keyed by user id
#[derive(Default)]
pub struct PersonaStore {
    personas: RwLock<HashMap<String, PersonaConfig>>,
}

impl PersonaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current persona for a user (the empty default if none was set)
    pub async fn get(&self, user_id: &str) -> PersonaConfig {
        self.personas
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn update(&self, user_id: &str, f: impl FnOnce(&mut PersonaConfig)) {
        let mut personas = self.personas.write().await;
        f(personas.entry(user_id.to_string()).or_default());
    }

    pub async fn update_definitions(&self, user_id: &str, definitions: Definitions) {
        self.update(user_id, |p| {
            if let Some(description) = definitions.description {
                p.description = description;
            }
            if let Some(personality) = definitions.personality {
                p.personality = personality;
            }
            if let Some(scenario) = definitions.scenario {
                p.scenario = scenario;
            }
        })
        .await;
    }

    /// An empty persona clears it
    pub async fn set_user_persona(&self, user_id: &str, persona: &str) {
        self.update(user_id, |p| p.user_persona = persona.to_string())
            .await;
    }

    pub async fn set_first_message(&self, user_id: &str, message: &str) {
        self.update(user_id, |p| p.first_message = message.to_string())
            .await;
    }

    pub async fn set_authors_note(&self, user_id: &str, note: &str) {
        self.update(user_id, |p| p.authors_note = note.to_string())
            .await;
    }

    pub async fn set_user_token(&self, user_id: &str, token: &str) {
        self.update(user_id, |p| p.user_token = token.to_string())
            .await;
    }

    pub async fn add_system_prompt(&self, user_id: &str, prompt: &str) {
        self.update(user_id, |p| p.system_prompts.push(prompt.to_string()))
            .await;
    }

    /// Pretty JSON of the user's persona
    pub async fn export(&self, user_id: &str) -> Result<String, PersonaError> {
        let persona = self.get(user_id).await;
        Ok(serde_json::to_string_pretty(&persona)?)
    }

    /// Replace the user's persona with a previously exported document
    pub async fn import(&self, user_id: &str, data: &str) -> Result<(), PersonaError> {
        let persona: PersonaConfig = serde_json::from_str(data)?;
        self.personas
            .write()
            .await
            .insert(user_id.to_string(), persona);
        Ok(())
    }
}
