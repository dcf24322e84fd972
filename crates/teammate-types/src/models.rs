use serde::{Deserialize, Serialize};

/// A remembered note, listed in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryNote {
    pub id: i64,
    pub text: String,
}

/// Per-chat gating flags, read once at the start of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatSettings {
    pub chat_id: i64,
    /// The bot answers in this chat at all (`/start` / `/stop`).
    pub enabled: bool,
    /// The operator has allowed this chat to use the bot.
    pub approved: bool,
}
