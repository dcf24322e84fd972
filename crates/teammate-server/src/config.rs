use std::str::FromStr;

use anyhow::{Context, Result, anyhow};

use teammate_api::gemini::DEFAULT_MODEL;
use teammate_engine::config::{EngineConfig, ResponseContract};

pub const DEFAULT_BOT_USERNAME: &str = "Sixth_Teammate_Bot";

/// Everything read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub bot_token: String,
    pub webhook_secret: Option<String>,
    pub bot_user_id: Option<i64>,
    pub bot_username: String,
    pub owner_user_id: Option<i64>,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub contract: ResponseContract,
    pub engine: EngineConfig,
    pub describe_media: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| var(key).ok_or_else(|| anyhow!("{} must be set", key));

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            direct_threshold: parse_or(var("TEAMMATE_DIRECT_THRESHOLD"), "TEAMMATE_DIRECT_THRESHOLD", defaults.direct_threshold)?,
            soft_threshold: parse_or(var("TEAMMATE_SOFT_THRESHOLD"), "TEAMMATE_SOFT_THRESHOLD", defaults.soft_threshold)?,
            max_history_chars: parse_or(var("TEAMMATE_MAX_HISTORY_CHARS"), "TEAMMATE_MAX_HISTORY_CHARS", defaults.max_history_chars)?,
            prune_cap: parse_or(var("TEAMMATE_PRUNE_CAP"), "TEAMMATE_PRUNE_CAP", defaults.prune_cap)?,
        };
        engine.validate()?;

        Ok(Self {
            host: var("TEAMMATE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(var("TEAMMATE_PORT"), "TEAMMATE_PORT", 3000)?,
            db_path: var("TEAMMATE_DB_PATH").unwrap_or_else(|| "teammate.db".into()),
            bot_token: required("TELEGRAM_BOT_TOKEN")?,
            webhook_secret: var("TELEGRAM_WEBHOOK_SECRET"),
            bot_user_id: parse_opt(var("TELEGRAM_BOT_USER_ID"), "TELEGRAM_BOT_USER_ID")?,
            bot_username: var("TELEGRAM_BOT_USERNAME").unwrap_or_else(|| DEFAULT_BOT_USERNAME.into()),
            owner_user_id: parse_opt(var("TEAMMATE_OWNER_USER_ID"), "TEAMMATE_OWNER_USER_ID")?,
            gemini_api_key: required("GEMINI_API_KEY")?,
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            contract: parse_or(var("TEAMMATE_RESPONSE_CONTRACT"), "TEAMMATE_RESPONSE_CONTRACT", ResponseContract::default())?,
            engine,
            describe_media: parse_or(var("TEAMMATE_DESCRIBE_MEDIA"), "TEAMMATE_DESCRIBE_MEDIA", true)?,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(value, key)?.unwrap_or(default))
}

fn parse_opt<T>(value: Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| v.parse::<T>().map_err(|e| anyhow!("{}", e)).with_context(|| format!("invalid {}: '{}'", key, v)))
        .transpose()
}
