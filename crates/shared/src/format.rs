//! Plain-text rendering of replies and conversation summaries.

use crate::agent_api::ChatMessage;
use regex::Regex;
use std::sync::OnceLock;

static THINK_BLOCK: OnceLock<Regex> = OnceLock::new();

fn think_block() -> &'static Regex {
    THINK_BLOCK.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"))
}

/// Drop `<think>...</think>` reasoning blocks and trim what is left.
///
/// An unclosed `<think>` is left untouched.
pub fn strip_reasoning(content: &str) -> String {
    think_block().replace_all(content, "").trim().to_string()
}

/// Display name for a message role.
pub fn role_label(role: &str) -> &'static str {
    if role == "user" {
        "You"
    } else {
        "Assistant"
    }
}

/// Shorten to 57 characters plus "..." when longer than 60 characters.
pub fn truncate_preview(content: &str) -> String {
    if content.chars().count() > 60 {
        let mut short: String = content.chars().take(57).collect();
        short.push_str("...");
        short
    } else {
        content.to_string()
    }
}

/// One line per message for the last five messages.
pub fn summarize(history: &[ChatMessage]) -> String {
    let start = history.len().saturating_sub(5);
    history[start..]
        .iter()
        .map(|m| format!("{}: {}", role_label(&m.role), truncate_preview(&m.content)))
        .collect::<Vec<_>>()
        .join("\n")
}
