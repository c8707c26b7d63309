//! Persona chat - role-play chat bot backed by an OpenAI-compatible proxy
//!
//! Keeps a per-user, in-memory conversation seeded from a configurable
//! character persona and serves it over HTTP.

mod api;
mod bot;
mod chat;
mod config;
mod llm;
mod persona;
mod session;

use api::{create_router, AppState};
use bot::Bot;
use chat::ChatService;
use config::Config;
use llm::{CompletionClient, LoggingService, ParamsStore, ProxyClient};
use persona::PersonaStore;
use session::{spawn_sweeper, SessionStore, SystemClock};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "persona_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = Config::from_env()?;
    tracing::info!(
        proxy_url = %config.proxy_url,
        model = %config.default_model,
        timeout_secs = config.request_timeout.as_secs(),
        session_timeout_secs = config.session_timeout.as_secs(),
        "Configuration loaded"
    );

    // Completion client
    let proxy = ProxyClient::new(
        &config.proxy_url,
        &config.proxy_password,
        config.request_timeout,
    )?;
    let client: Arc<dyn CompletionClient> = Arc::new(LoggingService::new(Arc::new(proxy)));

    // Stores
    let sessions = Arc::new(SessionStore::new(Arc::new(SystemClock)));
    let personas = Arc::new(PersonaStore::new());
    let params = Arc::new(ParamsStore::new(config.generation_defaults()));

    let _sweeper = spawn_sweeper(
        Arc::clone(&sessions),
        config.sweep_interval,
        config.session_timeout,
    );

    let chat = ChatService::new(sessions, personas, params, client)
        .with_context_tokens(config.context_tokens);
    let state = AppState::new(Bot::new(Arc::new(chat), config.cooldown));

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Persona chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
