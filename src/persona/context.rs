//! Seed context assembly
//!
//! The seed is the head of every prompt sent for a session, so its order is
//! fixed: description, personality, scenario, user persona, first message.

use super::PersonaConfig;
use crate::llm::{ChatMessage, Role};

/// Build the seed messages for a persona. Empty fields are skipped and an
/// all-empty persona yields an empty list.
pub fn build_context(persona: &PersonaConfig) -> Vec<ChatMessage> {
    let system_fields = [
        ("Character Description: ", &persona.description),
        ("Personality: ", &persona.personality),
        ("Scenario: ", &persona.scenario),
        ("User Persona: ", &persona.user_persona),
    ];

    let mut messages: Vec<ChatMessage> = system_fields
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(label, value)| ChatMessage::new(Role::System, format!("{label}{value}")))
        .collect();

    if !persona.first_message.is_empty() {
        messages.push(ChatMessage::new(Role::Assistant, &persona.first_message));
    }

    messages
}
