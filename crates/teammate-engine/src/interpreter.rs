//! Turns the model's answer into note edits and a reply decision.
//!
//! Note edits are applied before the reply decision and regardless of it: a
//! skipped turn can still teach the bot something. A payload that does not
//! parse changes nothing.

use thiserror::Error;
use tracing::debug;

use teammate_types::contract::StructuredReply;

use crate::config::{EngineConfig, ResponseContract};
use crate::memory::NoteStore;

/// First-line marker of a legacy free-text answer that declines to reply.
const LEGACY_SKIP: &str = "SKIP";

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("malformed AI response: {reason}")]
    Malformed { reason: String, raw: String },
}

impl InterpretError {
    /// The payload as received, for operator diagnostics.
    pub fn raw(&self) -> &str {
        match self {
            Self::Malformed { raw, .. } => raw,
        }
    }
}

/// A parsed model answer in either contract.
#[derive(Debug, Clone, PartialEq)]
pub enum AiResponse {
    Structured(StructuredReply),
    Legacy(String),
}

impl AiResponse {
    pub fn parse(raw: &str, contract: ResponseContract) -> Result<Self, InterpretError> {
        match contract {
            ResponseContract::Legacy => Ok(Self::Legacy(raw.to_string())),
            ResponseContract::Structured => serde_json::from_str(strip_code_fence(raw))
                .map(Self::Structured)
                .map_err(|e| InterpretError::Malformed {
                    reason: e.to_string(),
                    raw: raw.to_string(),
                }),
        }
    }
}

/// What to do with the chat after a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Send nothing.
    Silent,
    /// Post to the chat without threading.
    Soft(String),
    /// Reply to the triggering message.
    Direct(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Assertiveness {
    /// Graded by the configured thresholds.
    Score(f64),
    Soft,
    Direct,
}

/// Both contracts reduce to this before anything is applied.
#[derive(Debug, Clone, PartialEq)]
struct ReplyPlan {
    message: String,
    skip: bool,
    assertiveness: Assertiveness,
    add_notes: Vec<String>,
    remove_ids: Vec<i64>,
}

impl ReplyPlan {
    fn new(response: AiResponse, bot_username: &str) -> Self {
        match response {
            AiResponse::Structured(reply) => {
                let skip = reply.is_skip();
                Self {
                    message: reply.message.trim().to_string(),
                    skip,
                    assertiveness: Assertiveness::Score(reply.message_direct_refer),
                    add_notes: reply.add_note.map(|n| n.into_vec()).unwrap_or_default(),
                    remove_ids: reply
                        .remove_note
                        .map(|n| n.into_vec().iter().filter_map(|r| r.as_id()).collect())
                        .unwrap_or_default(),
                }
            }
            AiResponse::Legacy(text) => legacy_plan(&text, bot_username),
        }
    }
}

/// Legacy answers are either `SKIP`, a header line (`<bot> writes...` or
/// `<bot> replies...`) followed by the message, or just the message.
fn legacy_plan(text: &str, bot_username: &str) -> ReplyPlan {
    let text = text.trim();
    let mut lines = text.lines();
    let first = lines.next().unwrap_or("");

    let (message, skip, assertiveness) = if first.is_empty() || first.contains(LEGACY_SKIP) {
        (String::new(), true, Assertiveness::Soft)
    } else if let Some(assertiveness) = legacy_header(first, bot_username) {
        (lines.collect::<Vec<_>>().join("\n"), false, assertiveness)
    } else {
        (text.to_string(), false, Assertiveness::Soft)
    };

    ReplyPlan {
        message: message.trim().to_string(),
        skip,
        assertiveness,
        add_notes: Vec::new(),
        remove_ids: Vec::new(),
    }
}

/// Reads `<bot> replies...` as direct and `<bot> writes...` as soft. The bot
/// name may carry an `@` and be preceded by a `[timestamp]` as in transcripts.
fn legacy_header(line: &str, bot_username: &str) -> Option<Assertiveness> {
    let mut rest = line.trim();
    if rest.starts_with('[') {
        rest = rest.split_once(']').map_or(rest, |(_, after)| after.trim_start());
    }
    let rest = rest.strip_prefix('@').unwrap_or(rest);

    let name = rest.get(..bot_username.len())?;
    if !name.eq_ignore_ascii_case(bot_username) {
        return None;
    }
    let verb = rest.get(bot_username.len()..)?;
    if !verb.starts_with(char::is_whitespace) {
        return None;
    }

    let verb = verb.trim_start().to_ascii_lowercase();
    if verb.starts_with("replies") {
        Some(Assertiveness::Direct)
    } else if verb.starts_with("writes") {
        Some(Assertiveness::Soft)
    } else {
        None
    }
}

/// Parses a raw model answer, applies its note edits and decides the reply.
pub fn interpret(
    raw: &str,
    contract: ResponseContract,
    chat_id: i64,
    bot_username: &str,
    notes: &dyn NoteStore,
    config: &EngineConfig,
) -> Result<Decision, InterpretError> {
    let response = AiResponse::parse(raw, contract)?;
    Ok(apply(response, chat_id, bot_username, notes, config))
}

/// Applies a parsed answer: removals, then additions, then the reply decision.
pub fn apply(
    response: AiResponse,
    chat_id: i64,
    bot_username: &str,
    notes: &dyn NoteStore,
    config: &EngineConfig,
) -> Decision {
    let plan = ReplyPlan::new(response, bot_username);

    if !plan.remove_ids.is_empty() {
        notes.remove_notes(chat_id, &plan.remove_ids);
    }
    if !plan.add_notes.is_empty() {
        notes.add_notes(chat_id, &plan.add_notes);
    }

    decide(plan, config)
}

fn decide(plan: ReplyPlan, config: &EngineConfig) -> Decision {
    if plan.skip || plan.message.is_empty() {
        return Decision::Silent;
    }

    match plan.assertiveness {
        Assertiveness::Direct => Decision::Direct(plan.message),
        Assertiveness::Soft => Decision::Soft(plan.message),
        Assertiveness::Score(score) if score > config.direct_threshold => Decision::Direct(plan.message),
        Assertiveness::Score(score) if score > config.soft_threshold => Decision::Soft(plan.message),
        Assertiveness::Score(score) => {
            debug!("Reply score {} below soft threshold {}", score, config.soft_threshold);
            Decision::Silent
        }
    }
}

/// Models sometimes wrap JSON in a Markdown code block.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (```json) along with the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use teammate_types::models::MemoryNote;

    const BOT: &str = "Sixth_Teammate_Bot";

    /// In-memory store recording every call.
    #[derive(Default)]
    struct FakeNotes {
        notes: Mutex<Vec<MemoryNote>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl NoteStore for FakeNotes {
        fn list_notes(&self, _chat_id: i64) -> Vec<MemoryNote> {
            self.notes.lock().unwrap().clone()
        }

        fn add_notes(&self, _chat_id: i64, texts: &[String]) {
            self.calls.lock().unwrap().push("add");
            let mut notes = self.notes.lock().unwrap();
            for text in texts {
                let id = notes.last().map_or(1, |n| n.id + 1);
                notes.push(MemoryNote { id, text: text.clone() });
            }
        }

        fn remove_notes(&self, _chat_id: i64, ids: &[i64]) {
            self.calls.lock().unwrap().push("remove");
            self.notes.lock().unwrap().retain(|n| !ids.contains(&n.id));
        }

        fn clear_notes(&self, _chat_id: i64) {
            self.notes.lock().unwrap().clear();
        }
    }

    fn structured(raw: &str, notes: &FakeNotes) -> Result<Decision, InterpretError> {
        interpret(raw, ResponseContract::Structured, 1, BOT, notes, &EngineConfig::default())
    }

    fn scored(score: f64) -> Decision {
        let raw = format!(
            r#"{{"message":"hello","message_type":"reply","message_direct_refer":{}}}"#,
            score
        );
        structured(&raw, &FakeNotes::default()).unwrap()
    }

    #[test]
    fn thresholds_grade_the_reply() {
        assert_eq!(scored(95.0), Decision::Direct("hello".into()));
        assert_eq!(scored(70.0), Decision::Soft("hello".into()));
        assert_eq!(scored(30.0), Decision::Silent);
    }

    #[test]
    fn thresholds_are_exclusive() {
        assert_eq!(scored(90.0), Decision::Soft("hello".into()));
        assert_eq!(scored(50.0), Decision::Silent);
    }

    #[test]
    fn custom_thresholds_apply() {
        let config = EngineConfig {
            direct_threshold: 90.0,
            soft_threshold: 80.0,
            ..EngineConfig::default()
        };
        let raw = r#"{"message":"hi","message_type":"reply","message_direct_refer":70}"#;

        let decision = interpret(raw, ResponseContract::Structured, 1, BOT, &FakeNotes::default(), &config).unwrap();
        assert_eq!(decision, Decision::Silent);
    }

    #[test]
    fn skip_wins_over_score() {
        let raw = r#"{"message":"hello","message_type":"skip","message_direct_refer":100}"#;
        assert_eq!(structured(raw, &FakeNotes::default()).unwrap(), Decision::Silent);
    }

    #[test]
    fn empty_message_is_silent() {
        let raw = r#"{"message":"  ","message_type":"reply","message_direct_refer":100}"#;
        assert_eq!(structured(raw, &FakeNotes::default()).unwrap(), Decision::Silent);
    }

    #[test]
    fn notes_change_even_when_skipping() {
        let notes = FakeNotes::default();
        let raw = r#"{"message":"","message_type":"skip","message_direct_refer":0,"add_note":"X"}"#;

        assert_eq!(structured(raw, &notes).unwrap(), Decision::Silent);
        assert_eq!(notes.list_notes(1), vec![MemoryNote { id: 1, text: "X".into() }]);
    }

    #[test]
    fn removals_run_before_additions() {
        let notes = FakeNotes::default();
        notes.add_notes(1, &["old".into()]);
        notes.calls.lock().unwrap().clear();

        let raw = r#"{"message":"ok","message_type":"reply","message_direct_refer":60,
                      "add_note":["new one","another"],"remove_note":"1"}"#;

        assert_eq!(structured(raw, &notes).unwrap(), Decision::Soft("ok".into()));
        assert_eq!(*notes.calls.lock().unwrap(), vec!["remove", "add"]);
        let texts: Vec<String> = notes.list_notes(1).into_iter().map(|n| n.text).collect();
        assert_eq!(texts, vec!["new one", "another"]);
    }

    #[test]
    fn malformed_payload_leaves_notes_untouched() {
        let notes = FakeNotes::default();

        let not_json = structured("I think I'll stay quiet", &notes).unwrap_err();
        assert_eq!(not_json.raw(), "I think I'll stay quiet");

        let missing_type = structured(r#"{"message":"hi","add_note":"X"}"#, &notes);
        assert!(matches!(missing_type, Err(InterpretError::Malformed { .. })));

        assert!(notes.list_notes(1).is_empty());
        assert!(notes.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = "```json\n{\"message\":\"hey\",\"message_type\":\"reply\",\"message_direct_refer\":99}\n```";
        assert_eq!(structured(raw, &FakeNotes::default()).unwrap(), Decision::Direct("hey".into()));
    }

    #[test]
    fn legacy_skip_and_headers() {
        let notes = FakeNotes::default();
        let config = EngineConfig::default();
        let legacy = |raw: &str| interpret(raw, ResponseContract::Legacy, 1, BOT, &notes, &config).unwrap();

        assert_eq!(legacy("SKIP"), Decision::Silent);
        assert_eq!(legacy(""), Decision::Silent);
        assert_eq!(
            legacy("Sixth_Teammate_Bot replies...\nSee you there"),
            Decision::Direct("See you there".into())
        );
        assert_eq!(
            legacy("Sixth_Teammate_Bot writes...\nMorning all\nCoffee?"),
            Decision::Soft("Morning all\nCoffee?".into())
        );
        assert_eq!(legacy("Just a plain answer"), Decision::Soft("Just a plain answer".into()));
        assert_eq!(legacy("Sixth_Teammate_Bot writes..."), Decision::Silent);
    }

    #[test]
    fn legacy_sentence_mentioning_replies_is_the_message() {
        let notes = FakeNotes::default();
        let config = EngineConfig::default();
        let legacy = |raw: &str| interpret(raw, ResponseContract::Legacy, 1, BOT, &notes, &config).unwrap();

        assert_eq!(legacy("I bet she replies later"), Decision::Soft("I bet she replies later".into()));
        assert_eq!(
            legacy("Ann writes well\nBut Bob replies faster"),
            Decision::Soft("Ann writes well\nBut Bob replies faster".into())
        );
        assert_eq!(
            legacy("Sixth_Teammate_Botty replies...\nhi"),
            Decision::Soft("Sixth_Teammate_Botty replies...\nhi".into())
        );
    }

    #[test]
    fn legacy_header_variants() {
        let notes = FakeNotes::default();
        let config = EngineConfig::default();
        let legacy = |raw: &str| interpret(raw, ResponseContract::Legacy, 1, BOT, &notes, &config).unwrap();

        assert_eq!(
            legacy("[2023-11-14 22:13] Sixth_Teammate_Bot replies to ann \"hi\":\nHello Ann"),
            Decision::Direct("Hello Ann".into())
        );
        assert_eq!(legacy("@sixth_teammate_bot writes:\nHey"), Decision::Soft("Hey".into()));
    }
}
