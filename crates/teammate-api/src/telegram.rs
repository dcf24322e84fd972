//! Outbound Telegram Bot API calls.

use std::time::Duration;

use anyhow::{Result, anyhow};
use reqwest::Client;
use tracing::debug;

use teammate_types::telegram::{File, Message, TelegramResponse};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
/// Default timeout for Telegram API calls (seconds)
const API_TIMEOUT_SECS: u64 = 30;
/// Telegram rejects longer message texts.
pub const MAX_MESSAGE_CHARS: usize = 4096;

pub struct TelegramClient {
    client: Client,
    bot_token: String,
    base_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            bot_token: bot_token.into(),
            base_url: TELEGRAM_API_BASE.to_string(),
        }
    }

    /// Point at a different Bot API server (self-hosted or test).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.bot_token, method)
    }

    /// Sends `text`, split into several messages if too long. Only the first
    /// part is threaded to `reply_to_message_id`. Returns the sent messages.
    pub async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<Vec<Message>> {
        let mut sent = Vec::new();
        for (i, part) in split_message(text, MAX_MESSAGE_CHARS).iter().enumerate() {
            let reply_to = if i == 0 { reply_to_message_id } else { None };
            sent.push(self.send_message(chat_id, part, reply_to).await?);
        }
        Ok(sent)
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<Message> {
        let mut params = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        if let Some(reply_id) = reply_to_message_id {
            params["reply_to_message_id"] = serde_json::Value::Number(reply_id.into());
        }

        debug!("Sending message to chat {} (reply_to={:?})", chat_id, reply_to_message_id);
        self.call("sendMessage", &params).await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File> {
        self.call("getFile", &serde_json::json!({ "file_id": file_id })).await
    }

    /// Downloads a file previously resolved with [`Self::get_file`].
    pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/file/bot{}/{}", self.base_url, self.bot_token, file_path);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Telegram file download failed: {}", response.status()));
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn call<T>(&self, method: &str, params: &serde_json::Value) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(self.api_url(method))
            .json(params)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status();
        let api_response: TelegramResponse<T> = response
            .json()
            .await
            .map_err(|e| anyhow!("Telegram {} returned {} with unreadable body: {}", method, status, e))?;

        if api_response.ok {
            api_response
                .result
                .ok_or_else(|| anyhow!("Telegram returned ok but no result"))
        } else {
            Err(anyhow!(
                "Telegram API error: {} - {}",
                status,
                api_response.description.unwrap_or_default()
            ))
        }
    }
}

/// Splits on character boundaries, preferring the last newline in each chunk.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + max_chars).min(chars.len());
        if end < chars.len() {
            if let Some(newline) = chars[start..end].iter().rposition(|c| *c == '\n') {
                if newline > 0 {
                    end = start + newline + 1;
                }
            }
        }
        let part: String = chars[start..end].iter().collect();
        let part = part.trim_end_matches('\n');
        if !part.is_empty() {
            parts.push(part.to_string());
        }
        start = end;
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_part() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn long_text_breaks_at_newlines() {
        let parts = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(parts, vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn text_without_newlines_breaks_hard() {
        let parts = split_message("abcdefghij", 4);
        assert_eq!(parts, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn api_url_includes_token() {
        let client = TelegramClient::new("123:abc").with_base_url("http://localhost:8081/");
        assert_eq!(client.api_url("sendMessage"), "http://localhost:8081/bot123:abc/sendMessage");
    }
}
