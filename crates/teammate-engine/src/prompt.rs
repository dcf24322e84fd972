//! Assembles the single text prompt sent to the model.

use teammate_types::models::MemoryNote;

use crate::config::ResponseContract;
use crate::memory::render_notes;

/// Persona used until the operator sets a script with `/setScript`.
pub const DEFAULT_SCRIPT: &str = "You are a chat bot taking part in a group chat as one of the team. \
Be brief and friendly, answer in the language of the conversation, and only speak up when you have something useful to add.";

pub struct PromptInput<'a> {
    /// Operator-configured persona and rules; [`DEFAULT_SCRIPT`] when unset or blank.
    pub script: Option<&'a str>,
    pub bot_username: &'a str,
    pub history: &'a str,
    pub notes: &'a [MemoryNote],
    pub contract: ResponseContract,
}

pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let script = input
        .script
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SCRIPT);

    let mut prompt = String::new();
    prompt.push_str(script);
    prompt.push_str("\n\n");
    prompt.push_str(&format!("Your username in this chat is \"{}\".\n", input.bot_username));

    prompt.push_str("\nRecent chat history:\n");
    if input.history.is_empty() {
        prompt.push_str("(no messages yet)\n");
    } else {
        prompt.push_str(input.history);
        prompt.push('\n');
    }

    if !input.notes.is_empty() {
        prompt.push_str("\nThings you were asked to remember:\n");
        prompt.push_str(&render_notes(input.notes));
        prompt.push('\n');
    }

    prompt.push('\n');
    match input.contract {
        ResponseContract::Structured => prompt.push_str(STRUCTURED_INSTRUCTIONS),
        ResponseContract::Legacy => prompt.push_str(&legacy_instructions(input.bot_username)),
    }

    prompt
}

const STRUCTURED_INSTRUCTIONS: &str = "Answer with a single JSON object and nothing else:
{
  \"message\": string, your message to the chat, or \"\" to stay silent,
  \"message_type\": \"reply\" to send the message or \"skip\" to stay silent,
  \"message_direct_refer\": number 0-100, how directly the latest messages address you,
  \"add_note\": optional string or list of strings worth remembering for later,
  \"remove_note\": optional note id or list of ids that are no longer true
}
Do not start the message with the author name or a timestamp; the chat adds those.";

fn legacy_instructions(bot_username: &str) -> String {
    format!(
        "Respond to the chat if you want to add anything.\n\
         Start your reply with \"{0} writes...\" or \"{0} replies...\", then the message from a new line.\n\
         If you do not need to reply, write one word SKIP",
        bot_username
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(notes: &'a [MemoryNote], contract: ResponseContract) -> PromptInput<'a> {
        PromptInput {
            script: None,
            bot_username: "Sixth_Teammate_Bot",
            history: "[2023-11-14 22:13] ann writes:\nhi",
            notes,
            contract,
        }
    }

    #[test]
    fn includes_history_notes_and_contract() {
        let notes = vec![MemoryNote { id: 2, text: "Ann likes tea".into() }];

        let prompt = build_prompt(&input(&notes, ResponseContract::Structured));

        assert!(prompt.starts_with(DEFAULT_SCRIPT));
        assert!(prompt.contains("ann writes:\nhi"));
        assert!(prompt.contains("#2: Ann likes tea"));
        assert!(prompt.contains("\"message_direct_refer\""));
    }

    #[test]
    fn operator_script_replaces_default() {
        let mut input = input(&[], ResponseContract::Legacy);
        input.script = Some("You are a grumpy coach.");

        let prompt = build_prompt(&input);

        assert!(prompt.starts_with("You are a grumpy coach."));
        assert!(!prompt.contains("remember"));
        assert!(prompt.contains("write one word SKIP"));
    }
}
