//! HTTP front end for the chat bot

mod handlers;
mod types;

pub use handlers::create_router;

use crate::bot::Bot;
use crate::llm::CompletionClient;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<Bot<Arc<dyn CompletionClient>>>,
}

impl AppState {
    pub fn new(bot: Bot<Arc<dyn CompletionClient>>) -> Self {
        Self { bot: Arc::new(bot) }
    }
}
