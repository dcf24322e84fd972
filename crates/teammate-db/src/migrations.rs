use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE chats (
                chat_id     INTEGER PRIMARY KEY,
                enabled     INTEGER NOT NULL DEFAULT 0,
                approved    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE messages (
                chat_id             INTEGER NOT NULL,
                message_id          INTEGER NOT NULL,
                user_id             INTEGER NOT NULL,
                username            TEXT NOT NULL,
                message_text        TEXT NOT NULL,
                reply_to_message_id INTEGER,
                timestamp           INTEGER NOT NULL,
                PRIMARY KEY (chat_id, message_id)
            );

            CREATE INDEX idx_messages_chat_time
                ON messages(chat_id, timestamp);

            CREATE TABLE reactions (
                chat_id     INTEGER NOT NULL,
                message_id  INTEGER NOT NULL,
                user_id     INTEGER NOT NULL,
                username    TEXT NOT NULL,
                emoji       TEXT NOT NULL,
                PRIMARY KEY (chat_id, message_id, user_id),
                FOREIGN KEY (chat_id, message_id)
                    REFERENCES messages(chat_id, message_id) ON DELETE CASCADE
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (memory notes, settings)");
        conn.execute_batch(
            "
            CREATE TABLE notes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id     INTEGER NOT NULL,
                note_text   TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_notes_chat
                ON notes(chat_id, id);

            CREATE TABLE settings (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
