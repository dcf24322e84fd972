use crate::Database;
use crate::models::{HistoryRow, NewMessage, NoteRow, ReactionRow};
use anyhow::Result;
use rusqlite::{Connection, params, params_from_iter};
use teammate_types::models::ChatSettings;

impl Database {
    // -- Chats --

    /// Registers a chat on first sight, disabled and unapproved.
    pub fn ensure_chat(&self, chat_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO chats (chat_id, enabled, approved) VALUES (?1, 0, 0)",
                [chat_id],
            )?;
            Ok(())
        })
    }

    /// Unknown chats read as disabled and unapproved.
    pub fn get_chat_settings(&self, chat_id: i64) -> Result<ChatSettings> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT enabled, approved FROM chats WHERE chat_id = ?1",
                    [chat_id],
                    |row| Ok((row.get::<_, bool>(0)?, row.get::<_, bool>(1)?)),
                )
                .optional()?;

            let (enabled, approved) = row.unwrap_or((false, false));
            Ok(ChatSettings {
                chat_id,
                enabled,
                approved,
            })
        })
    }

    pub fn set_chat_enabled(&self, chat_id: i64, enabled: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chats SET enabled = ?2 WHERE chat_id = ?1",
                params![chat_id, enabled],
            )?;
            Ok(())
        })
    }

    pub fn set_chat_approved(&self, chat_id: i64, approved: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chats (chat_id, approved) VALUES (?1, ?2)
                 ON CONFLICT(chat_id) DO UPDATE SET approved = excluded.approved",
                params![chat_id, approved],
            )?;
            Ok(())
        })
    }

    // -- Settings --

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                (key, value),
            )?;
            Ok(())
        })
    }

    // -- Messages --

    /// Insert-if-absent on `(chat_id, message_id)`. Returns true when a row was written.
    pub fn insert_message(&self, msg: &NewMessage) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO messages
                    (chat_id, message_id, user_id, username, message_text, reply_to_message_id, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.chat_id,
                    msg.message_id,
                    msg.user_id,
                    msg.username,
                    msg.message_text,
                    msg.reply_to_message_id,
                    msg.timestamp,
                ],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn message_exists(&self, chat_id: i64, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM messages WHERE chat_id = ?1 AND message_id = ?2",
                    [chat_id, message_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// All messages of a chat, oldest first, with their reply targets resolved.
    pub fn get_chat_history(&self, chat_id: i64) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| query_history(conn, chat_id))
    }

    pub fn count_messages(&self, chat_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
                [chat_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Delete an explicit set of messages. Reactions go with them (ON DELETE CASCADE).
    pub fn delete_messages(&self, chat_id: i64, message_ids: &[i64]) -> Result<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..=message_ids.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "DELETE FROM messages WHERE chat_id = ?1 AND message_id IN ({})",
                placeholders.join(", ")
            );

            let values = std::iter::once(chat_id).chain(message_ids.iter().copied());
            let deleted = conn.execute(&sql, params_from_iter(values))?;
            Ok(deleted)
        })
    }

    // -- Reactions --

    /// Upsert a user's reaction, but only onto a message that exists.
    /// Returns false when the message is unknown and nothing was written.
    pub fn upsert_reaction(
        &self,
        chat_id: i64,
        message_id: i64,
        user_id: i64,
        username: &str,
        emoji: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT INTO reactions (chat_id, message_id, user_id, username, emoji)
                 SELECT ?1, ?2, ?3, ?4, ?5
                 WHERE EXISTS (SELECT 1 FROM messages WHERE chat_id = ?1 AND message_id = ?2)
                 ON CONFLICT(chat_id, message_id, user_id)
                    DO UPDATE SET emoji = excluded.emoji, username = excluded.username",
                params![chat_id, message_id, user_id, username, emoji],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_reaction(&self, chat_id: i64, message_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM reactions WHERE chat_id = ?1 AND message_id = ?2 AND user_id = ?3",
                [chat_id, message_id, user_id],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn get_chat_reactions(&self, chat_id: i64) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.message_id, r.user_id, r.username, r.emoji
                 FROM reactions r
                 JOIN messages m ON m.chat_id = r.chat_id AND m.message_id = r.message_id
                 WHERE r.chat_id = ?1
                 ORDER BY m.timestamp, r.message_id, r.rowid",
            )?;

            let rows = stmt
                .query_map([chat_id], |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        username: row.get(2)?,
                        emoji: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn count_reactions(&self, chat_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM reactions WHERE chat_id = ?1",
                [chat_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    // -- Notes --

    pub fn list_notes(&self, chat_id: i64) -> Result<Vec<NoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, note_text, created_at FROM notes WHERE chat_id = ?1 ORDER BY id",
            )?;

            let rows = stmt
                .query_map([chat_id], |row| {
                    Ok(NoteRow {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        note_text: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Returns the new note id.
    pub fn insert_note(&self, chat_id: i64, text: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notes (chat_id, note_text) VALUES (?1, ?2)",
                params![chat_id, text],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn delete_notes(&self, chat_id: i64, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (2..=ids.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "DELETE FROM notes WHERE chat_id = ?1 AND id IN ({})",
                placeholders.join(", ")
            );

            let values = std::iter::once(chat_id).chain(ids.iter().copied());
            Ok(conn.execute(&sql, params_from_iter(values))?)
        })
    }

    pub fn delete_note_by_text(&self, chat_id: i64, text: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM notes WHERE chat_id = ?1 AND note_text = ?2",
                params![chat_id, text],
            )?)
        })
    }

    pub fn clear_notes(&self, chat_id: i64) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM notes WHERE chat_id = ?1", [chat_id])?))
    }

    /// Drops notes and message history of a chat in one transaction.
    pub fn clear_chat(&self, chat_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM notes WHERE chat_id = ?1", [chat_id])?;
            tx.execute("DELETE FROM messages WHERE chat_id = ?1", [chat_id])?;
            tx.commit()?;
            Ok(())
        })
    }
}

fn query_history(conn: &Connection, chat_id: i64) -> Result<Vec<HistoryRow>> {
    // Self-join resolves reply targets in one pass; dangling targets come back NULL.
    let mut stmt = conn.prepare(
        "SELECT m.message_id, m.user_id, m.username, m.message_text, m.reply_to_message_id,
                m.timestamp, r.message_text, r.username
         FROM messages m
         LEFT JOIN messages r
                ON r.chat_id = m.chat_id AND r.message_id = m.reply_to_message_id
         WHERE m.chat_id = ?1
         ORDER BY m.timestamp ASC, m.message_id ASC",
    )?;

    let rows = stmt
        .query_map([chat_id], |row| {
            Ok(HistoryRow {
                message_id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                message_text: row.get(3)?,
                reply_to_message_id: row.get(4)?,
                timestamp: row.get(5)?,
                reply_to_text: row.get(6)?,
                reply_to_username: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
