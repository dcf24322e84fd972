//! Message store ingest: turns transport records into stored rows.
//!
//! Ingest is idempotent on `(chat_id, message_id)`. Retried webhook deliveries
//! and the bot's own echoed replies are expected and simply report
//! [`Ingest::Duplicate`].

use anyhow::Result;
use tracing::debug;

use teammate_db::Database;
use teammate_db::models::NewMessage;
use teammate_types::telegram::{Message, MessageReactionUpdated, User};

/// Who the bot is, so its own messages get a stable author name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: Option<i64>,
    pub username: String,
}

impl BotIdentity {
    fn is_bot_user(&self, user: &User) -> bool {
        match self.user_id {
            Some(id) => id == user.id,
            None => user.is_bot && user.username.as_deref() == Some(self.username.as_str()),
        }
    }
}

/// AI-produced text standing in for media the model cannot see directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDescriptions {
    pub photo: Option<String>,
    pub voice: Option<String>,
}

/// Result of [`ingest_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// A new row was written.
    Stored,
    /// The message was already stored.
    Duplicate,
    /// Nothing to store: the message had no text and no known attachment.
    Empty,
}

impl Ingest {
    pub fn stored(self) -> bool {
        self == Self::Stored
    }
}

/// Builds the stored text: attachment tags, then caption, then literal text.
pub fn synthesize_text(message: &Message, media: &MediaDescriptions) -> String {
    let mut content = String::new();

    if message.audio.is_some() {
        content.push_str("<Attached audio>");
    }
    if message.animation.is_some() {
        content.push_str("<Attached animation>");
    }
    if message.sticker.is_some() {
        content.push_str("<Sent sticker>");
    }
    if message.document.is_some() {
        content.push_str("<Attached document>");
    }
    if message.photo.is_some() {
        match described(&media.photo) {
            Some(description) => content.push_str(&format!("<Attached photo: {}>", description)),
            None => content.push_str("<Attached photo>"),
        }
    }
    if message.voice.is_some() {
        match described(&media.voice) {
            Some(transcript) => content.push_str(&format!("<Voice message: {}>", transcript)),
            None => content.push_str("<Attached voice message>"),
        }
    }
    if message.poll.is_some() {
        content.push_str("<Created poll>");
    }
    if message.location.is_some() {
        content.push_str("<Attached location>");
    }
    if let Some(dice) = &message.dice {
        content.push_str(&format!("<Thrown dice to {}>", dice.value));
    }

    if !content.is_empty() {
        content.push('\n');
    }
    if let Some(caption) = &message.caption {
        content.push_str(caption);
        content.push('\n');
    }
    if let Some(text) = &message.text {
        content.push_str(text);
    }

    content
}

fn described(text: &Option<String>) -> Option<&str> {
    text.as_deref().map(str::trim).filter(|t| !t.is_empty())
}

/// Author name as it appears in transcripts.
pub fn display_name(user: Option<&User>, bot: &BotIdentity) -> String {
    match user {
        Some(user) if bot.is_bot_user(user) => bot.username.clone(),
        Some(user) => match &user.username {
            Some(username) if !username.is_empty() => username.clone(),
            _ => format!("User_{}", user.id),
        },
        None => "Unknown".to_string(),
    }
}

/// Maps a transport message to a row. The text may be empty; see [`ingest_message`].
pub fn to_record(message: &Message, media: &MediaDescriptions, bot: &BotIdentity) -> NewMessage {
    NewMessage {
        chat_id: message.chat.id,
        message_id: message.message_id,
        user_id: message.from.as_ref().map(|u| u.id).unwrap_or_default(),
        username: display_name(message.from.as_ref(), bot),
        message_text: synthesize_text(message, media),
        reply_to_message_id: message.reply_to_message_id(),
        timestamp: message.date,
    }
}

/// Stores a message unless it is empty or already present.
pub fn ingest_message(db: &Database, record: &NewMessage) -> Result<Ingest> {
    if record.message_text.is_empty() {
        return Ok(Ingest::Empty);
    }

    if db.insert_message(record)? {
        Ok(Ingest::Stored)
    } else {
        debug!(
            "Message {} in chat {} already stored, skipping",
            record.message_id, record.chat_id
        );
        Ok(Ingest::Duplicate)
    }
}

/// Sets a user's reaction on a stored message. Reactions on unknown
/// messages are dropped and report false.
pub fn ingest_reaction(
    db: &Database,
    chat_id: i64,
    message_id: i64,
    user_id: i64,
    display_name: &str,
    emoji: &str,
) -> Result<bool> {
    let stored = db.upsert_reaction(chat_id, message_id, user_id, display_name, emoji)?;
    if !stored {
        debug!("Reaction on unknown message {} in chat {} dropped", message_id, chat_id);
    }
    Ok(stored)
}

/// Applies a transport reaction update. The newest printable reaction wins;
/// an empty reaction list withdraws the user's reaction. Anonymous reactions
/// are ignored.
pub fn ingest_reaction_update(
    db: &Database,
    update: &MessageReactionUpdated,
    bot: &BotIdentity,
) -> Result<bool> {
    let Some(user) = &update.user else {
        return Ok(false);
    };

    match update.new_reaction.iter().rev().find_map(|r| r.display()) {
        Some(emoji) => ingest_reaction(
            db,
            update.chat.id,
            update.message_id,
            user.id,
            &display_name(Some(user), bot),
            &emoji,
        ),
        None => db.delete_reaction(update.chat.id, update.message_id, user.id),
    }
}
