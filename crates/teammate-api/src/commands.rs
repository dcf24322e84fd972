//! Slash commands available in approved chats.

use anyhow::Result;
use tracing::info;

use teammate_db::Database;
use teammate_engine::memory::{MemoryStore, NoteStore, render_notes};

/// Settings key of the operator script that prefixes every prompt.
pub const SCRIPT_KEY: &str = "AI_REQUEST_SCRIPT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Start,
    Stop,
    Remember(String),
    Forget(String),
    Notes,
    Clear,
    GetScript,
    SetScript(String),
    Approve(String),
}

/// Parses `/name[@bot] args`. Commands addressed to another bot, and
/// unknown commands, yield `None`.
pub fn parse(text: &str, bot_username: &str) -> Option<Command> {
    let text = text.trim();
    let body = text.strip_prefix('/')?;
    let (head, args) = match body.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (body, ""),
    };

    let name = match head.split_once('@') {
        Some((name, target)) if target.eq_ignore_ascii_case(bot_username) => name,
        Some(_) => return None,
        None => head,
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "status" => Command::Status,
        "start" => Command::Start,
        "stop" => Command::Stop,
        "remember" => Command::Remember(args.to_string()),
        "forget" => Command::Forget(args.to_string()),
        "notes" => Command::Notes,
        "clear" => Command::Clear,
        "getscript" => Command::GetScript,
        "setscript" => Command::SetScript(args.to_string()),
        "approve" => Command::Approve(args.to_string()),
        _ => return None,
    };
    Some(command)
}

/// Runs a command and returns the text to answer with, if any.
/// Owner-only commands from other chats are ignored.
pub fn execute(db: &Database, chat_id: i64, owner_user_id: Option<i64>, command: Command) -> Result<Option<String>> {
    let is_owner = owner_user_id == Some(chat_id);
    let memory = MemoryStore::new(db);

    let reply = match command {
        Command::Status => {
            let settings = db.get_chat_settings(chat_id)?;
            if settings.enabled { "Service running" } else { "Service not running" }.to_string()
        }
        Command::Start => {
            db.set_chat_enabled(chat_id, true)?;
            "Service started".to_string()
        }
        Command::Stop => {
            db.set_chat_enabled(chat_id, false)?;
            "Service stopped".to_string()
        }
        Command::Remember(text) => {
            if text.is_empty() {
                "Value not specified!".to_string()
            } else {
                memory.add_notes(chat_id, &[text]);
                "Value remembered".to_string()
            }
        }
        Command::Forget(reference) => {
            if memory.forget(chat_id, &reference) {
                "Value forgot".to_string()
            } else {
                "Value not found!".to_string()
            }
        }
        Command::Notes => {
            let notes = memory.list_notes(chat_id);
            if notes.is_empty() {
                "Nothing remembered yet".to_string()
            } else {
                render_notes(&notes)
            }
        }
        Command::Clear => {
            db.clear_chat(chat_id)?;
            info!("Memory and history cleared for chat {}", chat_id);
            "Memory cleared".to_string()
        }
        Command::GetScript if is_owner => db.get_setting(SCRIPT_KEY)?.unwrap_or_default(),
        Command::SetScript(script) if is_owner => {
            db.set_setting(SCRIPT_KEY, &script)?;
            "Script set".to_string()
        }
        Command::Approve(target) if is_owner => match target.parse::<i64>() {
            Ok(target_chat) => {
                db.set_chat_approved(target_chat, true)?;
                info!("Chat {} approved by owner", target_chat);
                format!("Chat {} approved", target_chat)
            }
            Err(_) => "Chat id not specified!".to_string(),
        },
        Command::GetScript | Command::SetScript(_) | Command::Approve(_) => return Ok(None),
    };

    Ok(Some(reply))
}
