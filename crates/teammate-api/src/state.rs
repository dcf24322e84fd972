use std::sync::Arc;

use anyhow::Result;

use teammate_db::Database;
use teammate_engine::config::{EngineConfig, ResponseContract};
use teammate_engine::ingest::BotIdentity;

use crate::gemini::GeminiClient;
use crate::telegram::TelegramClient;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub telegram: TelegramClient,
    pub ai: GeminiClient,
    pub engine: EngineConfig,
    pub contract: ResponseContract,
    pub bot: BotIdentity,
    /// Private chat of the operator; unlocks `/getScript`, `/setScript`, `/approve`.
    pub owner_user_id: Option<i64>,
    /// Expected `X-Telegram-Bot-Api-Secret-Token`; unchecked when `None`.
    pub webhook_secret: Option<String>,
    /// Ask the model to describe photos and transcribe voice messages.
    pub describe_media: bool,
}

/// Runs blocking store work off the async runtime.
pub async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T>
where
    F: FnOnce(&AppStateInner) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state)).await?
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Nothing listens on the discard port, so outbound calls fail fast.
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    pub fn state(webhook_secret: Option<&str>) -> AppState {
        state_at(UNREACHABLE, webhook_secret)
    }

    /// Both clients talk to `base_url`, which stands in for Telegram and Gemini.
    pub fn state_at(base_url: &str, webhook_secret: Option<&str>) -> AppState {
        Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            telegram: TelegramClient::new("123:test").with_base_url(base_url),
            ai: GeminiClient::new("test-key", "test-model").with_base_url(base_url),
            engine: EngineConfig::default(),
            contract: ResponseContract::Structured,
            bot: BotIdentity {
                user_id: Some(1000),
                username: "Sixth_Teammate_Bot".into(),
            },
            owner_user_id: Some(500),
            webhook_secret: webhook_secret.map(str::to_string),
            describe_media: false,
        })
    }
}
