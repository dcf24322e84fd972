//! Database row types, mapped directly from SQLite rows.

/// A message to insert. `username` is the display name resolved at ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub username: String,
    pub message_text: String,
    pub reply_to_message_id: Option<i64>,
    pub timestamp: i64,
}

/// A stored message left-joined with the message it replies to.
/// `reply_to_*` are `None` when there is no reply or the target is gone.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub message_id: i64,
    pub user_id: i64,
    pub username: String,
    pub message_text: String,
    pub reply_to_message_id: Option<i64>,
    pub timestamp: i64,
    pub reply_to_text: Option<String>,
    pub reply_to_username: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub message_id: i64,
    pub user_id: i64,
    pub username: String,
    pub emoji: String,
}

#[derive(Debug, Clone)]
pub struct NoteRow {
    pub id: i64,
    pub chat_id: i64,
    pub note_text: String,
    pub created_at: String,
}
