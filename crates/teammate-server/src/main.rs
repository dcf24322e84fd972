mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::info;

use teammate_api::gemini::GeminiClient;
use teammate_api::middleware::require_webhook_secret;
use teammate_api::state::{AppState, AppStateInner};
use teammate_api::telegram::TelegramClient;
use teammate_api::webhook;
use teammate_engine::ingest::BotIdentity;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "teammate=debug,operator=warn,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = teammate_db::Database::open(&PathBuf::from(&config.db_path))?;
    if let Some(owner) = config.owner_user_id {
        db.set_chat_approved(owner, true)?;
    }

    info!(
        "Using model {} with {} contract (direct > {}, soft > {}, history {} chars)",
        config.gemini_model,
        config.contract,
        config.engine.direct_threshold,
        config.engine.soft_threshold,
        config.engine.max_history_chars
    );

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        telegram: TelegramClient::new(config.bot_token),
        ai: GeminiClient::new(config.gemini_api_key, config.gemini_model),
        engine: config.engine,
        contract: config.contract,
        bot: BotIdentity {
            user_id: config.bot_user_id,
            username: config.bot_username,
        },
        owner_user_id: config.owner_user_id,
        webhook_secret: config.webhook_secret,
        describe_media: config.describe_media,
    });

    // Routes
    let webhook_routes = Router::new()
        .route("/webhook", post(webhook::handle_update))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_webhook_secret))
        .with_state(app_state);

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(webhook_routes)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Teammate server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
