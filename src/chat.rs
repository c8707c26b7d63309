//! Conversation orchestration
//!
//! Sequences the session store, persona store and completion client for each
//! user action. The store lock is only held to snapshot or apply; the
//! provider round trip runs without it, guarded by a per-user permit.

mod error;

pub use error::ChatError;

use crate::llm::{
    temperature_in_range, ChatMessage, CompletionClient, CompletionRequest, ParamsStore, Role,
};
use crate::persona::{build_context, PersonaStore};
use crate::session::{
    ChatState, GenerationPermit, InFlight, Message, MessageId, Session, SessionStore,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;

/// Token budget reported by `memory` when none is configured
pub const DEFAULT_CONTEXT_TOKENS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[serde(alias = "txt")]
    Text,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
        }
    }
}

/// Rough size of a user's conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub messages: usize,
    pub estimated_tokens: usize,
    pub max_tokens: usize,
    pub context_kib: f64,
}

/// A stored user message and the outcome of answering it
#[derive(Debug)]
pub struct UserTurn {
    pub message: Message,
    pub reply: Result<Message, ChatError>,
}

/// What happened after an edited message was stored
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Updated,
    /// The edit left the conversation awaiting a reply, so one was generated
    Replied(Message),
}

pub struct ChatService<L: CompletionClient> {
    sessions: Arc<SessionStore>,
    personas: Arc<PersonaStore>,
    params: Arc<ParamsStore>,
    client: L,
    in_flight: InFlight,
    context_tokens: usize,
}

impl<L: CompletionClient> ChatService<L> {
    pub fn new(
        sessions: Arc<SessionStore>,
        personas: Arc<PersonaStore>,
        params: Arc<ParamsStore>,
        client: L,
    ) -> Self {
        Self {
            sessions,
            personas,
            params,
            client,
            in_flight: InFlight::new(),
            context_tokens: DEFAULT_CONTEXT_TOKENS,
        }
    }

    #[must_use]
    pub fn with_context_tokens(mut self, context_tokens: usize) -> Self {
        self.context_tokens = context_tokens;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn personas(&self) -> &Arc<PersonaStore> {
        &self.personas
    }

    pub fn params(&self) -> &Arc<ParamsStore> {
        &self.params
    }

    async fn seed_for(&self, user_id: &str) -> Vec<ChatMessage> {
        build_context(&self.personas.get(user_id).await)
    }

    async fn session(&self, user_id: &str) -> Session {
        let seed = self.seed_for(user_id).await;
        self.sessions.get_or_create(user_id, || seed).await
    }

    /// History without creating a session for a user who has none
    async fn history_or_seed(&self, user_id: &str) -> Vec<Message> {
        if let Some(session) = self.sessions.read(user_id).await {
            return session.history;
        }
        let now = self.sessions.now();
        self.seed_for(user_id)
            .await
            .into_iter()
            .map(|m| Message::from_chat(m, now))
            .collect()
    }

    fn acquire(&self, user_id: &str) -> Result<GenerationPermit, ChatError> {
        self.in_flight.try_acquire(user_id).ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "Rejected generation: one already in flight");
            ChatError::Busy
        })
    }

    /// One provider round trip from `session`'s history. The reply is appended
    /// only if the history has not changed in the meantime.
    async fn complete_and_append(
        &self,
        user_id: &str,
        session: &Session,
        _permit: GenerationPermit,
    ) -> Result<Message, ChatError> {
        let request = CompletionRequest {
            user_id: user_id.to_string(),
            messages: session.prompt(),
            params: self.params.get(user_id).await,
        };

        let reply = self.client.complete(&request).await?;

        let message = Message::new(Role::Assistant, reply, self.sessions.now());
        let appended = message.clone();
        self.sessions
            .mutate_if_unchanged(user_id, session, move |s| s.history.push(appended))
            .await
            .ok_or_else(|| {
                tracing::info!(user_id = %user_id, "Discarding reply for a changed conversation");
                ChatError::Superseded
            })?;

        Ok(message)
    }

    /// Throw the current conversation away and start again from the persona
    pub async fn create_new_chat(&self, user_id: &str) -> Session {
        let seed = self.seed_for(user_id).await;
        let session = self.sessions.reset(user_id, seed).await;
        tracing::info!(user_id = %user_id, seeded = session.history.len(), "Started new chat");
        session
    }

    pub async fn add_message(&self, user_id: &str, role: Role, content: &str) -> Message {
        let seed = self.seed_for(user_id).await;
        let message = Message::new(role, content, self.sessions.now());
        let appended = message.clone();
        self.sessions
            .mutate(user_id, || seed, move |s| s.history.push(appended))
            .await;
        message
    }

    /// Append a user message and answer it. Nothing is appended while a
    /// generation for the same user is running.
    pub async fn send_user_message(
        &self,
        user_id: &str,
        text: &str,
    ) -> Result<UserTurn, ChatError> {
        let permit = self.acquire(user_id)?;
        let message = self.add_message(user_id, Role::User, text).await;
        let reply = self.reply_to_trailing(user_id, permit).await;
        Ok(UserTurn { message, reply })
    }

    /// Reply to the trailing user message
    pub async fn generate_response(&self, user_id: &str) -> Result<Message, ChatError> {
        let permit = self.acquire(user_id)?;
        self.reply_to_trailing(user_id, permit).await
    }

    async fn reply_to_trailing(
        &self,
        user_id: &str,
        permit: GenerationPermit,
    ) -> Result<Message, ChatError> {
        let session = self.session(user_id).await;
        match session.state() {
            ChatState::AwaitingReply => {}
            ChatState::Empty => {
                return Err(ChatError::invalid("There are no messages to reply to"));
            }
            ChatState::Idle => {
                return Err(ChatError::invalid("The last message is not from the user"));
            }
        }
        self.complete_and_append(user_id, &session, permit).await
    }

    /// Drop the trailing assistant reply and ask for a new one.
    ///
    /// If the provider then fails, the old reply stays removed.
    pub async fn regenerate_last(&self, user_id: &str) -> Result<Message, ChatError> {
        let permit = self.acquire(user_id)?;
        let seed = self.seed_for(user_id).await;
        let trimmed = self
            .sessions
            .mutate(user_id, || seed, |s| {
                let regenerable = s.history.len() >= 2
                    && s.history.last().is_some_and(|m| m.role == Role::Assistant);
                if !regenerable {
                    return None;
                }
                s.history.pop();
                Some(s.clone())
            })
            .await
            .ok_or_else(|| ChatError::invalid("No message to regenerate!"))?;

        tracing::debug!(user_id = %user_id, "Regenerating last reply");
        self.complete_and_append(user_id, &trimmed, permit).await
    }

    /// Ask for more from the unmodified history. Returns the reply prefixed
    /// with the message it continues from.
    pub async fn continue_chat(&self, user_id: &str) -> Result<String, ChatError> {
        let permit = self.acquire(user_id)?;
        let session = self.session(user_id).await;
        let prior = session
            .history
            .last()
            .map(|m| m.content.clone())
            .ok_or_else(|| ChatError::invalid("There is nothing to continue from"))?;

        let reply = self.complete_and_append(user_id, &session, permit).await?;
        Ok(format!("Continuing from: {prior}\n\n{}", reply.content))
    }

    /// Remove the trailing message, whatever its role
    pub async fn undo_last(&self, user_id: &str) -> bool {
        let seed = self.seed_for(user_id).await;
        self.sessions
            .mutate(user_id, || seed, |s| s.history.pop().is_some())
            .await
    }

    /// Re-seed the history from the current persona
    pub async fn clear_chat(&self, user_id: &str) -> Session {
        let seed = self.seed_for(user_id).await;
        let session = self.sessions.reset(user_id, seed).await;
        tracing::info!(user_id = %user_id, "Cleared chat memory");
        session
    }

    pub async fn export_chat(
        &self,
        user_id: &str,
        format: ExportFormat,
    ) -> Result<String, ChatError> {
        let history = self.history_or_seed(user_id).await;
        match format {
            ExportFormat::Json => Ok(serde_json::to_string(&history)?),
            ExportFormat::Text => Ok(history.iter().fold(String::new(), |mut out, m| {
                let _ = writeln!(out, "{}: {}", m.role, m.content);
                out
            })),
        }
    }

    /// Snapshot the history under a fresh chat id
    pub async fn save_chat(&self, user_id: &str) -> String {
        let session = self.session(user_id).await;
        let chat_id = self.sessions.save_snapshot(user_id, session.history).await;
        tracing::info!(user_id = %user_id, chat_id = %chat_id, "Saved chat");
        chat_id
    }

    pub async fn load_chat(&self, user_id: &str, chat_id: &str) -> Result<(), ChatError> {
        match self.sessions.saved_chat(chat_id).await {
            Some(saved) if saved.owner == user_id => {
                tracing::debug!(
                    user_id = %user_id,
                    chat_id = %chat_id,
                    saved_at = %saved.saved_at,
                    messages = saved.messages.len(),
                    "Saved chat found but cannot be restored"
                );
                Err(ChatError::NotImplemented(
                    "restoring saved chats is not supported".to_string(),
                ))
            }
            _ => Err(ChatError::not_found(format!("chat {chat_id}"))),
        }
    }

    /// Replace a message's text. Generates a reply when the edit leaves the
    /// owner's conversation awaiting one. Nothing changes while the owner
    /// has a generation running.
    pub async fn edit_message(
        &self,
        message_id: MessageId,
        text: &str,
    ) -> Result<EditOutcome, ChatError> {
        let not_found = || ChatError::not_found(format!("message {message_id}"));
        let (owner, _) = self
            .sessions
            .find_message(message_id)
            .await
            .ok_or_else(not_found)?;
        let permit = self.acquire(&owner)?;
        if !self.sessions.update_message_content(message_id, text).await {
            return Err(not_found());
        }

        match self.sessions.read(&owner).await {
            Some(session) if session.state() == ChatState::AwaitingReply => self
                .complete_and_append(&owner, &session, permit)
                .await
                .map(EditOutcome::Replied),
            _ => Ok(EditOutcome::Updated),
        }
    }

    pub async fn delete_message(&self, message_id: MessageId) -> bool {
        self.sessions.delete_message(message_id).await
    }

    pub async fn memory_stats(&self, user_id: &str) -> MemoryStats {
        let history = self.history_or_seed(user_id).await;
        let chars: usize = history.iter().map(|m| m.content.chars().count()).sum();
        let bytes: usize = history.iter().map(|m| m.content.len()).sum();
        #[allow(clippy::cast_precision_loss)]
        let context_kib = bytes as f64 / 1024.0;
        MemoryStats {
            messages: history.len(),
            estimated_tokens: chars.div_ceil(4),
            max_tokens: self.context_tokens,
            context_kib,
        }
    }

    pub async fn switch_model(&self, user_id: &str, model: &str) -> Result<(), ChatError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(ChatError::invalid("Model name cannot be empty"));
        }
        self.params.switch_model(user_id, model).await;
        tracing::info!(user_id = %user_id, model = %model, "Switched model");
        Ok(())
    }

    pub async fn set_temperature(
        &self,
        user_id: &str,
        temperature: f64,
    ) -> Result<(), ChatError> {
        if !temperature_in_range(temperature) {
            return Err(ChatError::invalid("Temperature must be between 0.0 and 2.0"));
        }
        self.params.set_temperature(user_id, temperature).await;
        Ok(())
    }

    /// Flip the stream hint; the session mirrors the new value
    pub async fn toggle_stream(&self, user_id: &str) -> bool {
        let enabled = self.params.toggle_stream(user_id).await;
        let seed = self.seed_for(user_id).await;
        self.sessions.set_streaming(user_id, || seed, enabled).await;
        enabled
    }
}
