//! Named commands and their replies

use super::{render_error, Bot, Reply};
use crate::chat::{ChatError, ExportFormat};
use crate::llm::CompletionClient;
use crate::persona::Definitions;
use serde::Deserialize;
use std::time::Instant;

const HELP: &str = "Available Commands:\n\
`/new-chat` - Start a new chat session\n\
`/regenerate` - Regenerate last response\n\
`/continue` - Continue from last message\n\
`/undo` - Remove the last message\n\
`/set-definitions` - Set bot personality\n\
`/set-userpersona` - Set your character\n\
`/set-first-message` - Set the bot's opening line\n\
`/set-authors-note` - Set an author's note\n\
`/set-usertoken` - Set your user token\n\
`/add-system-prompt` - Add a system prompt\n\
`/switch-model` - Change the AI model\n\
`/set-temperature` - Set response randomness (0.0-2.0)\n\
`/toggle-stream` - Toggle streaming mode\n\
`/memory` - Show memory usage\n\
`/clear-memory` - Clear chat memory\n\
`/export-chat` - Export chat history\n\
`/save-chat` - Save current chat\n\
`/load-chat` - Load saved chat\n\
`/backup` - Back up current chat\n\
`/restore` - Restore a backup\n\
`/stats` - Show chat statistics\n\
`/ping` - Check bot latency";

/// A named command with its options, as `{"name": ..., "options": {...}}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "options", rename_all = "kebab-case")]
pub enum Command {
    NewChat,
    Regenerate,
    Continue,
    Undo,
    SaveChat,
    LoadChat {
        #[serde(rename = "chat-id")]
        chat_id: String,
    },
    ToggleStream,
    SetTemperature {
        value: f64,
    },
    SwitchModel {
        model: String,
    },
    ExportChat {
        #[serde(default = "default_export_format")]
        format: ExportFormat,
    },
    SetDefinitions {
        description: String,
        personality: String,
        #[serde(default)]
        scenario: Option<String>,
    },
    SetUserpersona {
        #[serde(default)]
        persona: Option<String>,
    },
    Memory,
    ClearMemory,
    Help,
    Stats,
    Ping,
    SetFirstMessage {
        message: String,
    },
    SetAuthorsNote {
        note: String,
    },
    SetUsertoken {
        token: String,
    },
    AddSystemPrompt {
        prompt: String,
    },
    Backup,
    Restore {
        #[serde(rename = "backup-id")]
        backup_id: String,
    },
}

fn default_export_format() -> ExportFormat {
    ExportFormat::Text
}

impl Command {
    /// Command name as users type it
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewChat => "new-chat",
            Self::Regenerate => "regenerate",
            Self::Continue => "continue",
            Self::Undo => "undo",
            Self::SaveChat => "save-chat",
            Self::LoadChat { .. } => "load-chat",
            Self::ToggleStream => "toggle-stream",
            Self::SetTemperature { .. } => "set-temperature",
            Self::SwitchModel { .. } => "switch-model",
            Self::ExportChat { .. } => "export-chat",
            Self::SetDefinitions { .. } => "set-definitions",
            Self::SetUserpersona { .. } => "set-userpersona",
            Self::Memory => "memory",
            Self::ClearMemory => "clear-memory",
            Self::Help => "help",
            Self::Stats => "stats",
            Self::Ping => "ping",
            Self::SetFirstMessage { .. } => "set-first-message",
            Self::SetAuthorsNote { .. } => "set-authors-note",
            Self::SetUsertoken { .. } => "set-usertoken",
            Self::AddSystemPrompt { .. } => "add-system-prompt",
            Self::Backup => "backup",
            Self::Restore { .. } => "restore",
        }
    }
}

fn or_error<T>(result: Result<T, ChatError>, ok: impl FnOnce(T) -> Reply) -> Reply {
    result.map_or_else(|e| Reply::text(render_error(&e)), ok)
}

fn either(flag: bool, yes: &str, no: &str) -> Reply {
    Reply::text(if flag { yes } else { no })
}

impl<L: CompletionClient> Bot<L> {
    pub async fn on_command(&self, user_id: &str, command: Command) -> Reply {
        tracing::info!(user_id = %user_id, command = command.name(), "Handling command");
        let chat = &self.chat;

        match command {
            Command::NewChat => {
                chat.create_new_chat(user_id).await;
                Reply::text("New chat session started! 🌟")
            }
            Command::Regenerate => {
                or_error(chat.regenerate_last(user_id).await, |m| Reply::text(m.content))
            }
            Command::Continue => or_error(chat.continue_chat(user_id).await, Reply::text),
            Command::Undo => either(
                chat.undo_last(user_id).await,
                "↩️ Last message removed from history",
                "❌ No messages to remove",
            ),
            Command::SaveChat => {
                let chat_id = chat.save_chat(user_id).await;
                Reply::text(format!("💾 Chat saved! ID: `{chat_id}`"))
            }
            Command::LoadChat { chat_id } => self.load(user_id, &chat_id).await,
            Command::ToggleStream => either(
                chat.toggle_stream(user_id).await,
                "Stream mode enabled! 📺",
                "Stream mode disabled! 📴",
            ),
            Command::SetTemperature { value } => {
                or_error(chat.set_temperature(user_id, value).await, |()| {
                    Reply::text(format!("🌡️ Temperature set to {value:.2}"))
                })
            }
            Command::SwitchModel { model } => {
                or_error(chat.switch_model(user_id, &model).await, |()| {
                    Reply::text(format!("🔄 Switched to {} model", model.trim()))
                })
            }
            Command::ExportChat { format } => self.export(user_id, format).await,
            Command::SetDefinitions {
                description,
                personality,
                scenario,
            } => {
                let definitions = Definitions {
                    description: Some(description),
                    personality: Some(personality),
                    scenario,
                };
                chat.personas().update_definitions(user_id, definitions).await;
                Reply::text("✅ Bot definitions updated successfully!")
            }
            Command::SetUserpersona { persona } => {
                self.set_user_persona(user_id, persona.unwrap_or_default().trim())
                    .await
            }
            Command::Memory => self.memory_report(user_id).await,
            Command::ClearMemory => {
                chat.clear_chat(user_id).await;
                Reply::text("Chat memory cleared! 🧹")
            }
            Command::Help => Reply::text(HELP),
            Command::Stats => self.stats(user_id).await,
            Command::Ping => self.ping(user_id).await,
            Command::SetFirstMessage { message } => {
                chat.personas().set_first_message(user_id, &message).await;
                Reply::text("First message updated! ✨")
            }
            Command::SetAuthorsNote { note } => {
                chat.personas().set_authors_note(user_id, &note).await;
                Reply::text("Author's note updated! 📝")
            }
            Command::SetUsertoken { token } => {
                chat.personas().set_user_token(user_id, &token).await;
                Reply::text("🔑 User token set successfully!")
            }
            Command::AddSystemPrompt { prompt } => {
                chat.personas().add_system_prompt(user_id, &prompt).await;
                Reply::text("System prompt added! 🧩")
            }
            Command::Backup => {
                let backup_id = chat.save_chat(user_id).await;
                Reply::text(format!("Backup created! ID: {backup_id} 💾"))
            }
            Command::Restore { backup_id } => {
                or_error(chat.load_chat(user_id, &backup_id).await, |()| {
                    Reply::text(format!("Restored from backup: {backup_id} 📥"))
                })
            }
        }
    }

    async fn load(&self, user_id: &str, chat_id: &str) -> Reply {
        match self.chat.load_chat(user_id, chat_id).await {
            Ok(()) => Reply::text("📂 Chat loaded successfully!"),
            Err(ChatError::NotFound(_)) => Reply::text("❌ Chat not found or error loading chat"),
            Err(e) => Reply::text(render_error(&e)),
        }
    }

    async fn export(&self, user_id: &str, format: ExportFormat) -> Reply {
        or_error(self.chat.export_chat(user_id, format).await, |body| {
            Reply::text("📤 Here's your chat export:")
                .with_attachment(format!("chat_export.{}", format.extension()), body)
        })
    }

    async fn set_user_persona(&self, user_id: &str, persona: &str) -> Reply {
        self.chat.personas().set_user_persona(user_id, persona).await;
        either(
            persona.is_empty(),
            "User persona cleared! 🔄",
            "User persona updated! ✨",
        )
    }

    async fn memory_report(&self, user_id: &str) -> Reply {
        let stats = self.chat.memory_stats(user_id).await;
        Reply::text(format!(
            "📊 Memory Usage:\nTokens: {}/{}\nMessages: {}\nContext Size: {:.2} KB",
            stats.estimated_tokens, stats.max_tokens, stats.messages, stats.context_kib
        ))
    }

    async fn stats(&self, user_id: &str) -> Reply {
        let stats = self.chat.memory_stats(user_id).await;
        let active = self.chat.sessions().len().await;
        Reply::text(format!(
            "Chat Statistics:\nMessages: {}\nActive chats: {active}\n",
            stats.messages
        ))
    }

    async fn ping(&self, user_id: &str) -> Reply {
        let start = Instant::now();
        self.chat.sessions().read(user_id).await;
        Reply::text(format!("🏓 Pong! Latency: {}ms", start.elapsed().as_millis()))
    }
}
