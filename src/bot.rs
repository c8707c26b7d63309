//! Chat front end
//!
//! Turns inbound chat events and named commands into orchestrator calls and
//! renders the outcome as user-facing reply text.

mod commands;

pub use commands::Command;

use crate::chat::{ChatError, ChatService, EditOutcome};
use crate::session::Message;
use crate::llm::CompletionClient;
use crate::session::MessageId;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

const ERROR_REPLY: &str = "An error occurred while processing your request.";

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?\d+>").expect("mention pattern is valid"));

/// File attached to a reply (chat exports)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub body: String,
}

/// What the bot says back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    /// Stored id of the inbound message, for later edits and deletes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachment: None,
            message_id: None,
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, filename: impl Into<String>, body: impl Into<String>) -> Self {
        self.attachment = Some(Attachment {
            filename: filename.into(),
            body: body.into(),
        });
        self
    }

    #[must_use]
    pub fn for_message(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }
}

/// An inbound chat message
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub text: String,
    /// The message replies to something the bot said
    pub reply_to_bot: bool,
    pub mentions_bot: bool,
}

/// Remove `<@id>` / `<@!id>` mention tokens
pub fn strip_mentions(text: &str) -> String {
    MENTION.replace_all(text, "").trim().to_string()
}

/// User-facing text for an orchestrator failure
pub fn render_error(error: &ChatError) -> String {
    match error {
        ChatError::Transport(_) | ChatError::Provider(_) | ChatError::Export(_) => {
            ERROR_REPLY.to_string()
        }
        ChatError::InvalidOperation(message) => format!("❌ {message}"),
        ChatError::NotFound(what) => format!("❌ Could not find {what}"),
        ChatError::NotImplemented(what) => format!("🚧 Sorry, {what} yet"),
        ChatError::Busy => "⏳ Still working on your last message, hang on!".to_string(),
        ChatError::Superseded => {
            "🔄 The chat changed before the reply arrived, so it was dropped.".to_string()
        }
    }
}

fn answer(user_id: &str, result: Result<Message, ChatError>) -> Reply {
    match result {
        Ok(reply) => Reply::text(reply.content),
        Err(e) => {
            if e.is_provider_failure() {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to answer message");
            } else {
                tracing::debug!(user_id = %user_id, error = %e, "Message not answered");
            }
            Reply::text(render_error(&e))
        }
    }
}

pub struct Bot<L: CompletionClient> {
    chat: Arc<ChatService<L>>,
    cooldown: Duration,
}

impl<L: CompletionClient> Bot<L> {
    pub fn new(chat: Arc<ChatService<L>>, cooldown: Duration) -> Self {
        Self { chat, cooldown }
    }

    pub fn chat(&self) -> &Arc<ChatService<L>> {
        &self.chat
    }

    /// Handle a chat message. Messages that neither reply to nor mention the
    /// bot are ignored.
    pub async fn on_message(&self, user_id: &str, incoming: &IncomingMessage) -> Option<Reply> {
        if !incoming.reply_to_bot && !incoming.mentions_bot {
            return None;
        }
        let text = strip_mentions(&incoming.text);
        if text.is_empty() {
            return None;
        }

        if self.chat.sessions().is_in_cooldown(user_id, self.cooldown).await {
            tracing::debug!(user_id = %user_id, "Message arrived during cooldown");
            return Some(Reply::text("⏳ Slow down a little! Try again in a moment."));
        }

        let turn = match self.chat.send_user_message(user_id, &text).await {
            Ok(turn) => turn,
            Err(e) => {
                tracing::debug!(user_id = %user_id, error = %e, "Message turned away");
                return Some(Reply::text(render_error(&e)));
            }
        };
        Some(answer(user_id, turn.reply).for_message(turn.message.id))
    }

    /// Answer the trailing user message again, e.g. after a provider failure
    pub async fn on_retry(&self, user_id: &str) -> Reply {
        answer(user_id, self.chat.generate_response(user_id).await)
    }

    /// Handle an edited message. Unknown messages are ignored.
    pub async fn on_edit(&self, message_id: MessageId, text: &str) -> Option<Reply> {
        match self.chat.edit_message(message_id, text).await {
            Ok(EditOutcome::Replied(reply)) => Some(Reply::text(reply.content)),
            Ok(EditOutcome::Updated) => Some(Reply::text("✏️ Message updated")),
            Err(ChatError::NotFound(_)) => None,
            Err(e) => {
                tracing::warn!(message_id = %message_id, error = %e, "Failed to answer edit");
                Some(Reply::text(render_error(&e)))
            }
        }
    }

    /// Handle a deleted message; true if it was part of a conversation
    pub async fn on_delete(&self, message_id: MessageId) -> bool {
        self.chat.delete_message(message_id).await
    }
}
