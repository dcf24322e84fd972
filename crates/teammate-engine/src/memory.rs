//! Per-chat memory notes.
//!
//! Memory enhances replies but never gates them: every operation logs and
//! swallows storage errors.

use tracing::warn;

use teammate_db::Database;
use teammate_types::models::MemoryNote;

/// Note operations the reply path depends on.
pub trait NoteStore {
    /// Notes in ascending id order; empty on failure.
    fn list_notes(&self, chat_id: i64) -> Vec<MemoryNote>;

    /// Adds one note per non-blank entry, trimmed.
    fn add_notes(&self, chat_id: i64, texts: &[String]);

    /// Unknown ids are ignored.
    fn remove_notes(&self, chat_id: i64, ids: &[i64]);

    fn clear_notes(&self, chat_id: i64);
}

/// [`NoteStore`] backed by the SQLite database.
pub struct MemoryStore<'a> {
    db: &'a Database,
}

impl<'a> MemoryStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Removes a note by id (`3` or `#3`) or else by exact text.
    /// Returns whether anything was removed.
    pub fn forget(&self, chat_id: i64, reference: &str) -> bool {
        let reference = reference.trim();
        let result = match reference.trim_start_matches('#').parse::<i64>() {
            Ok(id) => self.db.delete_notes(chat_id, &[id]),
            Err(_) => self.db.delete_note_by_text(chat_id, reference),
        };

        match result {
            Ok(count) => count > 0,
            Err(e) => {
                warn!("Failed to forget note in chat {}: {}", chat_id, e);
                false
            }
        }
    }
}

impl NoteStore for MemoryStore<'_> {
    fn list_notes(&self, chat_id: i64) -> Vec<MemoryNote> {
        match self.db.list_notes(chat_id) {
            Ok(rows) => rows
                .into_iter()
                .map(|row| MemoryNote {
                    id: row.id,
                    text: row.note_text,
                })
                .collect(),
            Err(e) => {
                warn!("Failed to list notes for chat {}: {}", chat_id, e);
                Vec::new()
            }
        }
    }

    fn add_notes(&self, chat_id: i64, texts: &[String]) {
        for text in texts.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if let Err(e) = self.db.insert_note(chat_id, text) {
                warn!("Failed to add note to chat {}: {}", chat_id, e);
            }
        }
    }

    fn remove_notes(&self, chat_id: i64, ids: &[i64]) {
        if let Err(e) = self.db.delete_notes(chat_id, ids) {
            warn!("Failed to remove notes {:?} from chat {}: {}", ids, chat_id, e);
        }
    }

    fn clear_notes(&self, chat_id: i64) {
        if let Err(e) = self.db.clear_notes(chat_id) {
            warn!("Failed to clear notes of chat {}: {}", chat_id, e);
        }
    }
}

/// One `#id: text` line per note.
pub fn render_notes(notes: &[MemoryNote]) -> String {
    notes
        .iter()
        .map(|note| format!("#{}: {}", note.id, note.text))
        .collect::<Vec<_>>()
        .join("\n")
}
