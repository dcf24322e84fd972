//! Telegram webhook: ingest, commands and the reply turn.

use anyhow::Result;
use axum::{Json, extract::State, http::StatusCode};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use teammate_engine::history::build_history;
use teammate_engine::ingest::{self, MediaDescriptions};
use teammate_engine::interpreter::{Decision, interpret};
use teammate_engine::memory::{MemoryStore, NoteStore};
use teammate_engine::prompt::{PromptInput, build_prompt};
use teammate_types::telegram::{Message, Update};

use crate::commands::{self, SCRIPT_KEY};
use crate::media::describe_media;
use crate::state::{AppState, run_blocking};

pub const UNAUTHORIZED_MESSAGE: &str = "Sorry, this bot is not available in this chat.";

/// Telegram redelivers on non-2xx. Only failures before the message is stored
/// return 500; a failed reply turn is logged and acknowledged.
pub async fn handle_update(State(state): State<AppState>, Json(mut update): Json<Update>) -> StatusCode {
    let result = if let Some(reaction) = update.message_reaction.take() {
        let bot = state.bot.clone();
        run_blocking(&state, move |s| ingest::ingest_reaction_update(&s.db, &reaction, &bot))
            .await
            .map(|_| ())
    } else if let Some(message) = update.any_message().cloned() {
        handle_message(&state, message).await
    } else {
        debug!("Ignoring update {} with no handled payload", update.update_id);
        Ok(())
    };

    match result {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!("Update {} failed: {:#}", update.update_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn handle_message(state: &AppState, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    let settings = run_blocking(state, move |s| {
        s.db.ensure_chat(chat_id)?;
        s.db.get_chat_settings(chat_id)
    })
    .await?;

    if !settings.approved {
        if message.chat.is_private() {
            info!("Refusing private chat {}", chat_id);
            state.telegram.send_message(chat_id, UNAUTHORIZED_MESSAGE, None).await?;
        } else {
            debug!("Ignoring message in unapproved chat {}", chat_id);
        }
        return Ok(());
    }

    if message.text_or_empty().starts_with('/') {
        if let Some(command) = commands::parse(message.text_or_empty(), &state.bot.username) {
            return run_command(state, chat_id, command).await;
        }
    }

    if !settings.enabled {
        return Ok(());
    }

    let message_id = message.message_id;
    if run_blocking(state, move |s| s.db.message_exists(chat_id, message_id)).await? {
        debug!("Message {} in chat {} already handled", message_id, chat_id);
        return Ok(());
    }

    let media = describe_media(state, &message).await;
    let record = ingest::to_record(&message, &media, &state.bot);
    match run_blocking(state, move |s| ingest::ingest_message(&s.db, &record)).await {
        Ok(outcome) if outcome.stored() => {
            // The message is stored now, so a redelivery would be skipped as a
            // duplicate. Acknowledge instead of asking for a retry.
            if let Err(e) = run_turn(state, chat_id, message_id).await {
                error!("Turn for message {} in chat {} failed: {:#}", message_id, chat_id, e);
            }
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("Could not store message {} in chat {}, skipping turn: {:#}", message_id, chat_id, e);
            Ok(())
        }
    }
}

async fn run_command(state: &AppState, chat_id: i64, command: commands::Command) -> Result<()> {
    debug!("Command {:?} in chat {}", command, chat_id);
    let owner = state.owner_user_id;
    let reply = run_blocking(state, move |s| commands::execute(&s.db, chat_id, owner, command)).await?;

    if let Some(reply) = reply {
        state.telegram.send_text(chat_id, &reply, None).await?;
    }
    Ok(())
}

/// One reply turn for the newest message in `chat_id`.
async fn run_turn(state: &AppState, chat_id: i64, message_id: i64) -> Result<()> {
    let span = info_span!("turn", turn_id = %Uuid::new_v4(), chat_id, message_id);
    async move {
        let (history, notes, script) = run_blocking(state, move |s| {
            let history = build_history(&s.db, chat_id, s.engine.max_history_chars, s.engine.prune_cap);
            let notes = MemoryStore::new(&s.db).list_notes(chat_id);
            let script = s.db.get_setting(SCRIPT_KEY).unwrap_or_else(|e| {
                warn!("Could not read script, using default: {:#}", e);
                None
            });
            Ok((history, notes, script))
        })
        .await?;

        let prompt = build_prompt(&PromptInput {
            script: script.as_deref(),
            bot_username: &state.bot.username,
            history: &history,
            notes: &notes,
            contract: state.contract,
        });
        debug!("Prompt is {} chars with {} notes", prompt.chars().count(), notes.len());

        let raw = state.ai.generate(&prompt, state.contract.wants_json()).await?;

        let contract = state.contract;
        let decision = run_blocking(state, move |s| {
            Ok(interpret(&raw, contract, chat_id, &s.bot.username, &MemoryStore::new(&s.db), &s.engine))
        })
        .await?;

        match decision {
            Ok(Decision::Silent) => {
                debug!("Staying silent");
                Ok(())
            }
            Ok(Decision::Soft(text)) => deliver(state, chat_id, &text, None).await,
            Ok(Decision::Direct(text)) => deliver(state, chat_id, &text, Some(message_id)).await,
            Err(e) => {
                error!(target: "operator", chat_id, raw = e.raw(), "{}", e);
                Ok(())
            }
        }
    }
    .instrument(span)
    .await
}

/// Sends the reply and records it in history like any other message.
async fn deliver(state: &AppState, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<()> {
    let sent = state.telegram.send_text(chat_id, text, reply_to).await?;
    info!("Replied with {} message(s), threaded: {}", sent.len(), reply_to.is_some());

    let bot = state.bot.clone();
    let stored = run_blocking(state, move |s| {
        for message in &sent {
            let record = ingest::to_record(message, &MediaDescriptions::default(), &bot);
            if let Err(e) = ingest::ingest_message(&s.db, &record) {
                warn!("Could not record sent message {}: {:#}", message.message_id, e);
            }
        }
        Ok(())
    })
    .await;

    if let Err(e) = stored {
        warn!("Recording sent messages failed: {:#}", e);
    }
    Ok(())
}
