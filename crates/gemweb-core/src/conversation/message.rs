//! Message types and canonical forms
//!
//! A [`Message`] is the in-flight pair of role and text. A
//! [`StoredMessage`] is the persisted form of the same pair; it uses the
//! name `content` on the wire. A [`ConversationRecord`] is one persisted
//! session snapshot together with its upstream metadata handle.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub text: String,
}

impl Message {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }

    /// Convenience constructor for a user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self::new("user", text)
    }

    /// Convenience constructor for an assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new("assistant", text)
    }

    /// Convenience constructor for a system turn
    pub fn system(text: impl Into<String>) -> Self {
        Self::new("system", text)
    }
}

/// Persisted form of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
}

/// One persisted session snapshot with metadata
///
/// `messages` is non-empty and ends with an assistant or system turn;
/// records are only built from completed upstream calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub model: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<String>,
    pub messages: Vec<StoredMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize a role to canonical form: lowercase, trimmed, `model` maps to
/// `assistant`.
pub fn normalize_role(role: &str) -> String {
    let r = role.trim().to_ascii_lowercase();
    if r == "model" {
        "assistant".to_string()
    } else {
        r
    }
}

/// Coalesce consecutive assistant messages into one, joining their text
/// with a single newline. System messages and ordering are preserved.
pub fn sanitize_assistant_messages(msgs: &[Message]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(msgs.len());
    for msg in msgs {
        let is_assistant = normalize_role(&msg.role) == "assistant";
        if is_assistant {
            if let Some(last) = out.last_mut() {
                if normalize_role(&last.role) == "assistant" {
                    last.text.push('\n');
                    last.text.push_str(&msg.text);
                    continue;
                }
            }
        }
        out.push(msg.clone());
    }
    out
}

/// Role-normalized, text-exact list equality
pub fn equal_messages(a: &[Message], b: &[Message]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| normalize_role(&x.role) == normalize_role(&y.role) && x.text == y.text)
}

/// Convert in-flight messages to their persisted form
pub fn to_stored_messages(msgs: &[Message]) -> Vec<StoredMessage> {
    msgs.iter()
        .map(|m| StoredMessage {
            role: m.role.clone(),
            content: m.text.clone(),
        })
        .collect()
}

/// Convert persisted messages back to the in-flight form
pub fn stored_to_messages(stored: &[StoredMessage]) -> Vec<Message> {
    stored
        .iter()
        .map(|m| Message {
            role: m.role.clone(),
            text: m.content.clone(),
        })
        .collect()
}

fn think_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid regex"))
}

/// Strip `<think>…</think>` blocks from assistant text before persistence
pub fn remove_think_tags(text: &str) -> String {
    think_tag_pattern().replace_all(text, "").trim_start().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_role_is_idempotent() {
        assert_eq!(normalize_role("Model"), "assistant");
        assert_eq!(normalize_role(&normalize_role("Model")), "assistant");
        assert_eq!(normalize_role("  USER "), "user");
        assert_eq!(normalize_role("system"), "system");
    }

    #[test]
    fn sanitize_coalesces_consecutive_assistant_turns() {
        let msgs = vec![
            Message::user("q"),
            Message::assistant("part one"),
            Message::new("model", "part two"),
            Message::user("next"),
        ];
        let sanitized = sanitize_assistant_messages(&msgs);
        assert_eq!(sanitized.len(), 3);
        assert_eq!(sanitized[1].text, "part one\npart two");
        assert_eq!(sanitized[2].text, "next");
    }

    #[test]
    fn sanitize_preserves_system_messages() {
        let msgs = vec![
            Message::system("rules"),
            Message::assistant("a"),
            Message::system("more rules"),
            Message::assistant("b"),
        ];
        let sanitized = sanitize_assistant_messages(&msgs);
        assert_eq!(sanitized.len(), 4);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let msgs = vec![
            Message::assistant("a"),
            Message::assistant("b"),
            Message::user("c"),
        ];
        let once = sanitize_assistant_messages(&msgs);
        let twice = sanitize_assistant_messages(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn equal_messages_ignores_role_case() {
        let a = vec![Message::new("Model", "hi")];
        let b = vec![Message::assistant("hi")];
        assert!(equal_messages(&a, &b));
        assert!(!equal_messages(&a, &[Message::assistant("bye")]));
    }

    #[test]
    fn stored_round_trip() {
        let msgs = vec![Message::user("hi"), Message::assistant("hello")];
        assert_eq!(stored_to_messages(&to_stored_messages(&msgs)), msgs);
    }

    #[test]
    fn think_tags_are_removed() {
        let text = "<think>internal\nreasoning</think>The answer is 4.";
        assert_eq!(remove_think_tags(text), "The answer is 4.");
        assert_eq!(remove_think_tags("plain"), "plain");
    }
}
