//! Telegram Bot API records, limited to the fields the bot reads.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

/// One webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub edited_message: Option<Message>,
    #[serde(default)]
    pub message_reaction: Option<MessageReactionUpdated>,
}

impl Update {
    /// New and edited messages are handled the same way.
    pub fn any_message(&self) -> Option<&Message> {
        self.message.as_ref().or(self.edited_message.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    /// "private", "group", "supergroup" or "channel"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    /// Unix seconds.
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,

    // Attachments: only presence matters for most kinds.
    #[serde(default)]
    pub audio: Option<IgnoredAny>,
    #[serde(default)]
    pub animation: Option<IgnoredAny>,
    #[serde(default)]
    pub sticker: Option<IgnoredAny>,
    #[serde(default)]
    pub document: Option<IgnoredAny>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub voice: Option<Voice>,
    #[serde(default)]
    pub poll: Option<IgnoredAny>,
    #[serde(default)]
    pub location: Option<IgnoredAny>,
    #[serde(default)]
    pub dice: Option<Dice>,
}

impl Message {
    pub fn reply_to_message_id(&self) -> Option<i64> {
        self.reply_to_message.as_ref().map(|m| m.message_id)
    }

    /// Literal text only, used for command detection.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub file_id: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dice {
    #[serde(default)]
    pub emoji: String,
    pub value: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageReactionUpdated {
    pub chat: Chat,
    pub message_id: i64,
    /// Absent for anonymous reactions.
    #[serde(default)]
    pub user: Option<User>,
    pub date: i64,
    #[serde(default)]
    pub old_reaction: Vec<ReactionType>,
    #[serde(default)]
    pub new_reaction: Vec<ReactionType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactionType {
    Emoji { emoji: String },
    CustomEmoji { custom_emoji_id: String },
    #[serde(other)]
    Other,
}

impl ReactionType {
    /// Text to show in a transcript, if the reaction has a printable form.
    pub fn display(&self) -> Option<String> {
        match self {
            Self::Emoji { emoji } => Some(emoji.clone()),
            Self::CustomEmoji { .. } => Some("<custom emoji>".to_string()),
            Self::Other => None,
        }
    }
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}
