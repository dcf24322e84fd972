//! History window: the size-bounded transcript shown to the model.
//!
//! Messages are taken newest-first until the next one would overflow the
//! budget, then put back in chronological order. Selection stops at the first
//! overflow; older messages never fill leftover slack. Each build also prunes a
//! few of the oldest messages that fell out of the window.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::DateTime;
use tracing::{error, info, warn};

use teammate_db::Database;
use teammate_db::models::{HistoryRow, ReactionRow};

/// Blank line between transcript entries.
pub const SEPARATOR: &str = "\n\n";

/// Quoted reply targets are cut to this many characters.
pub const QUOTE_CHARS: usize = 20;

/// The messages that made it into the transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Window {
    /// Message ids, oldest first.
    pub message_ids: Vec<i64>,
    /// Ids still reachable from the window: retained messages and their reply targets.
    pub referenced: HashSet<i64>,
    pub transcript: String,
}

/// Builds the transcript for a chat and prunes what fell out of it.
///
/// Storage failures never propagate: a failed read yields an empty transcript
/// and a failed prune is only logged.
pub fn build_history(db: &Database, chat_id: i64, max_chars: usize, prune_cap: usize) -> String {
    let (rows, reactions) = match load(db, chat_id) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Failed to load history for chat {}: {}", chat_id, e);
            return String::new();
        }
    };

    let window = select_window(&rows, &reactions, max_chars);

    match prune(db, chat_id, &rows, &window, prune_cap) {
        Ok(0) => {}
        Ok(count) => info!("Pruned {} old messages from chat {}", count, chat_id),
        Err(e) => warn!("History prune failed for chat {}: {}", chat_id, e),
    }

    window.transcript
}

fn load(db: &Database, chat_id: i64) -> Result<(Vec<HistoryRow>, HashMap<i64, Vec<ReactionRow>>)> {
    let rows = db.get_chat_history(chat_id)?;

    let mut reactions: HashMap<i64, Vec<ReactionRow>> = HashMap::new();
    for reaction in db.get_chat_reactions(chat_id)? {
        reactions.entry(reaction.message_id).or_default().push(reaction);
    }

    Ok((rows, reactions))
}

/// Renders one transcript entry.
pub fn render_entry(row: &HistoryRow, reactions: &[ReactionRow]) -> String {
    let timestamp = format_timestamp(row.timestamp);

    let mut entry = match (&row.reply_to_text, &row.reply_to_username) {
        (Some(target_text), Some(target_author)) if row.reply_to_message_id.is_some() => format!(
            "[{}] {} replies to {} \"{}\":\n{}",
            timestamp,
            row.username,
            target_author,
            quote(target_text),
            row.message_text
        ),
        _ => format!("[{}] {} writes:\n{}", timestamp, row.username, row.message_text),
    };

    if !reactions.is_empty() {
        let list: Vec<String> = reactions
            .iter()
            .map(|r| format!("{} ({})", r.emoji, r.username))
            .collect();
        entry.push_str("\nReactions: ");
        entry.push_str(&list.join(", "));
    }

    entry
}

/// First line of the target, cut to [`QUOTE_CHARS`] with an ellipsis.
fn quote(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() > QUOTE_CHARS {
        let cut: String = first_line.chars().take(QUOTE_CHARS).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}

fn format_timestamp(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| unix_secs.to_string())
}

/// Picks the most recent entries that fit in `max_chars` characters,
/// separators included. `rows` must be oldest first.
pub fn select_window(
    rows: &[HistoryRow],
    reactions: &HashMap<i64, Vec<ReactionRow>>,
    max_chars: usize,
) -> Window {
    let separator_len = SEPARATOR.chars().count();
    let mut total = 0usize;
    let mut picked: Vec<(&HistoryRow, String)> = Vec::new();

    for row in rows.iter().rev() {
        let entry = render_entry(row, reactions.get(&row.message_id).map(Vec::as_slice).unwrap_or(&[]));
        let len = entry.chars().count();
        let cost = if picked.is_empty() { len } else { len + separator_len };

        if total + cost > max_chars {
            break;
        }
        total += cost;
        picked.push((row, entry));
    }

    picked.reverse();

    let mut referenced = HashSet::new();
    for (row, _) in &picked {
        referenced.insert(row.message_id);
        if let Some(target) = row.reply_to_message_id {
            referenced.insert(target);
        }
    }

    let message_ids = picked.iter().map(|(row, _)| row.message_id).collect();
    let entries: Vec<String> = picked.into_iter().map(|(_, entry)| entry).collect();

    Window {
        message_ids,
        referenced,
        transcript: entries.join(SEPARATOR),
    }
}

/// Oldest messages outside the window, at most `cap` of them.
/// Nothing is pruned when the window is empty.
pub fn prune_candidates(rows: &[HistoryRow], window: &Window, cap: usize) -> Vec<i64> {
    if window.message_ids.is_empty() {
        return Vec::new();
    }

    rows.iter()
        .map(|row| row.message_id)
        .filter(|id| !window.referenced.contains(id))
        .take(cap)
        .collect()
}

fn prune(db: &Database, chat_id: i64, rows: &[HistoryRow], window: &Window, cap: usize) -> Result<usize> {
    let doomed = prune_candidates(rows, window, cap);
    db.delete_messages(chat_id, &doomed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use teammate_db::models::NewMessage;

    const CHAT: i64 = 77;
    const T0: i64 = 1_700_000_000;

    fn row(message_id: i64, text: &str) -> HistoryRow {
        HistoryRow {
            message_id,
            user_id: 1,
            username: "ann".into(),
            message_text: text.into(),
            reply_to_message_id: None,
            timestamp: T0 + message_id,
            reply_to_text: None,
            reply_to_username: None,
        }
    }

    /// A row whose rendered entry is exactly `len` characters long.
    fn row_of_len(message_id: i64, len: usize) -> HistoryRow {
        let header = render_entry(&row(message_id, ""), &[]).chars().count();
        row(message_id, &"x".repeat(len - header))
    }

    fn store(db: &Database, message_id: i64, text: &str, reply_to: Option<i64>) {
        db.insert_message(&NewMessage {
            chat_id: CHAT,
            message_id,
            user_id: 1,
            username: "ann".into(),
            message_text: text.into(),
            reply_to_message_id: reply_to,
            timestamp: T0 + message_id,
        })
        .unwrap();
    }

    #[test]
    fn renders_plain_entry() {
        assert_eq!(
            render_entry(&row(0, "hello\nworld"), &[]),
            "[2023-11-14 22:13] ann writes:\nhello\nworld"
        );
    }

    #[test]
    fn reply_quote_is_truncated_to_twenty_chars() {
        let mut reply = row(2, "agreed");
        reply.reply_to_message_id = Some(1);
        reply.reply_to_text = Some("abcdefghijklmnopqrstuvwxyz".into());
        reply.reply_to_username = Some("bo".into());

        let entry = render_entry(&reply, &[]);
        assert!(entry.contains("ann replies to bo \"abcdefghijklmnopqrst...\":\nagreed"));
    }

    #[test]
    fn short_quote_is_kept_whole() {
        let mut reply = row(2, "yes");
        reply.reply_to_message_id = Some(1);
        reply.reply_to_text = Some("lunch?\nat noon".into());
        reply.reply_to_username = Some("bo".into());

        assert!(render_entry(&reply, &[]).contains("replies to bo \"lunch?\":"));
    }

    #[test]
    fn reactions_are_listed_after_text() {
        let reactions = vec![
            ReactionRow { message_id: 0, user_id: 2, username: "bo".into(), emoji: "👍".into() },
            ReactionRow { message_id: 0, user_id: 3, username: "cy".into(), emoji: "🔥".into() },
        ];

        let entry = render_entry(&row(0, "ship it"), &reactions);
        assert!(entry.ends_with("ship it\nReactions: 👍 (bo), 🔥 (cy)"));
    }

    #[test]
    fn most_recent_entries_win() {
        let rows = vec![row_of_len(1, 9000), row_of_len(2, 50), row_of_len(3, 50)];

        let window = select_window(&rows, &HashMap::new(), 120);

        assert_eq!(window.message_ids, vec![2, 3]);
        assert_eq!(window.transcript.chars().count(), 102);
    }

    #[test]
    fn walk_stops_at_first_overflow() {
        // The oldest entry would fit in the slack, but the walk has already stopped.
        let rows = vec![row_of_len(1, 40), row_of_len(2, 9000), row_of_len(3, 50)];

        let window = select_window(&rows, &HashMap::new(), 120);

        assert_eq!(window.message_ids, vec![3]);
    }

    #[test]
    fn budget_is_never_exceeded() {
        let rows: Vec<HistoryRow> = (0..40).map(|i| row(i, &"y".repeat((i as usize * 7) % 60))).collect();

        for max_chars in [0, 1, 35, 36, 80, 200, 1000, 5000] {
            let window = select_window(&rows, &HashMap::new(), max_chars);
            assert!(window.transcript.chars().count() <= max_chars, "budget {}", max_chars);
        }
    }

    #[test]
    fn window_is_chronological() {
        let rows = vec![row(1, "first"), row(2, "second")];

        let window = select_window(&rows, &HashMap::new(), 8192);

        assert!(window.transcript.find("first").unwrap() < window.transcript.find("second").unwrap());
        assert!(window.transcript.contains("first\n\n["));
    }

    #[test]
    fn prune_keeps_reply_targets_and_respects_cap() {
        let mut rows: Vec<HistoryRow> = (1..=15).map(|i| row_of_len(i, 40)).collect();
        rows[14].reply_to_message_id = Some(2);

        let window = select_window(&rows, &HashMap::new(), 40);
        assert_eq!(window.message_ids, vec![15]);

        let doomed = prune_candidates(&rows, &window, 10);
        assert_eq!(doomed, vec![1, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn nothing_is_pruned_when_window_is_empty() {
        let rows = vec![row_of_len(1, 40), row_of_len(2, 500)];

        let window = select_window(&rows, &HashMap::new(), 100);
        assert!(window.message_ids.is_empty());
        assert!(prune_candidates(&rows, &window, 10).is_empty());
    }

    #[test]
    fn build_history_prunes_store_and_cascades_reactions() {
        let db = Database::open_in_memory().unwrap();
        store(&db, 1, &"a".repeat(500), None);
        store(&db, 2, "old but quoted", None);
        store(&db, 3, "short", Some(2));
        db.upsert_reaction(CHAT, 1, 5, "bo", "👍").unwrap();

        let transcript = build_history(&db, CHAT, 100, 10);

        assert!(transcript.contains("replies to ann \"old but quoted\""));
        assert!(!transcript.contains("aaaa"));
        assert_eq!(db.count_messages(CHAT).unwrap(), 2);
        assert_eq!(db.count_reactions(CHAT).unwrap(), 0);
    }

    #[test]
    fn dangling_reply_renders_as_plain_entry() {
        let db = Database::open_in_memory().unwrap();
        store(&db, 3, "answer", Some(1));

        let transcript = build_history(&db, CHAT, 8192, 10);

        assert_eq!(transcript, "[2023-11-14 22:13] ann writes:\nanswer");
    }

    #[test]
    fn empty_chat_yields_empty_transcript() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(build_history(&db, CHAT, 8192, 10), "");
    }
}
