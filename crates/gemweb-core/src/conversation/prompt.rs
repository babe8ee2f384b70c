//! Prompt assembly
//!
//! The upstream accepts a single text prompt. When every message is a user
//! turn the texts are joined plainly; otherwise each turn is wrapped in
//! role tags and an unclosed assistant tag solicits the next turn.

use super::message::{normalize_role, Message};
use regex::Regex;
use std::sync::OnceLock;

/// Appended to messages that look like XML when code mode is on
const XML_WRAP_HINT: &str = "\n\nIf your reply contains XML or HTML markup, wrap every such block in a fenced code block tagged xml (```xml ... ```).";

/// True when any message carries a non-user role
pub fn need_role_tags(msgs: &[Message]) -> bool {
    msgs.iter().any(|m| normalize_role(&m.role) != "user")
}

/// Wrap content in a role tag. The unclosed form omits the end marker and
/// is used to solicit the next assistant turn.
pub fn add_role_tag(role: &str, content: &str, unclose: bool) -> String {
    let role = if role.is_empty() { "user" } else { role };
    if unclose {
        format!("<|im_start|>{}\n{}", role, content)
    } else {
        format!("<|im_start|>{}\n{}\n<|im_end|>", role, content)
    }
}

/// Construct the final prompt from a message list
///
/// Untagged rendering joins texts with single newlines. Tagged rendering
/// wraps each message and, when `append_assistant` is set, ends with an
/// unclosed assistant tag with trailing whitespace trimmed.
pub fn build_prompt(msgs: &[Message], tagged: bool, append_assistant: bool) -> String {
    if msgs.is_empty() {
        if tagged && append_assistant {
            return add_role_tag("assistant", "", true);
        }
        return String::new();
    }
    if !tagged {
        return msgs
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
    }
    let mut out = String::new();
    for msg in msgs {
        out.push_str(&add_role_tag(&msg.role, &msg.text, false));
        out.push('\n');
    }
    if append_assistant {
        out.push_str(&add_role_tag("assistant", "", true));
    }
    out.trim().to_string()
}

fn xml_open_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"< *[^>]+>").expect("valid regex"))
}

/// Append the XML fencing hint to messages containing XML-looking tags
///
/// Operates on a copy of the outgoing suffix only; stored history is never
/// rewritten. When `disabled` is set the input is returned unchanged.
pub fn append_xml_wrap_hint_if_needed(msgs: &[Message], disabled: bool) -> Vec<Message> {
    if disabled {
        return msgs.to_vec();
    }
    msgs.iter()
        .map(|m| {
            if xml_open_tag_pattern().is_match(&m.text) {
                Message::new(m.role.clone(), format!("{}{}", m.text, XML_WRAP_HINT))
            } else {
                m.clone()
            }
        })
        .collect()
}
