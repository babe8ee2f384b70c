//! Deterministic conversation hashes
//!
//! A prefix hash is a SHA-256 hex digest over the normalized role/text
//! sequence of a message list, salted by scope. The global scope is salted
//! only by the canonical model name; the account scope adds an identity
//! salt so that the same history stored by different accounts never
//! collides, and so that records are discoverable under both the stable
//! client id and the legacy account identifier.

use super::message::{normalize_role, StoredMessage};
use crate::models::normalize_model;
use sha2::{Digest, Sha256};

// Field and record separators keep distinct sequences from concatenating
// into the same byte stream.
const FIELD_SEP: u8 = 0x1f;
const RECORD_SEP: u8 = 0x1e;
const SCOPE_SEP: u8 = 0x1d;

/// Hex-encoded SHA-256 of an arbitrary string
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn digest_conversation(id_salt: Option<&str>, model: &str, msgs: &[StoredMessage]) -> String {
    let mut hasher = Sha256::new();
    if let Some(id) = id_salt {
        hasher.update(id.as_bytes());
        hasher.update([SCOPE_SEP]);
    }
    hasher.update(normalize_model(model).as_bytes());
    hasher.update([SCOPE_SEP]);
    for msg in msgs {
        hasher.update(normalize_role(&msg.role).as_bytes());
        hasher.update([FIELD_SEP]);
        hasher.update(msg.content.as_bytes());
        hasher.update([RECORD_SEP]);
    }
    format!("{:x}", hasher.finalize())
}

/// Hash a conversation in the global scope, salted only by model
pub fn hash_conversation(model: &str, msgs: &[StoredMessage]) -> String {
    digest_conversation(None, model, msgs)
}

/// Hash a conversation in an account scope
///
/// `id` is either the stable client id or the legacy account identifier.
pub fn hash_conversation_for_account(id: &str, model: &str, msgs: &[StoredMessage]) -> String {
    digest_conversation(Some(id), model, msgs)
}

/// Build the key for the account-level metadata keyspace
pub fn account_meta_key(account_id: &str, model: &str) -> String {
    format!("account-meta|{}|{}", account_id, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::message::{sanitize_assistant_messages, to_stored_messages, Message};

    fn stored(msgs: &[Message]) -> Vec<StoredMessage> {
        to_stored_messages(msgs)
    }

    #[test]
    fn hash_is_deterministic() {
        let msgs = stored(&[Message::user("hi"), Message::assistant("hello")]);
        assert_eq!(
            hash_conversation("gemini-2.5-flash", &msgs),
            hash_conversation("gemini-2.5-flash", &msgs)
        );
    }

    #[test]
    fn role_case_does_not_change_the_hash() {
        let a = stored(&[Message::new("Model", "hello")]);
        let b = stored(&[Message::assistant("hello")]);
        assert_eq!(
            hash_conversation("gemini-2.5-flash", &a),
            hash_conversation("gemini-2.5-flash", &b)
        );
    }

    #[test]
    fn scopes_are_disjoint() {
        let msgs = stored(&[Message::user("hi"), Message::assistant("hello")]);
        let global = hash_conversation("gemini-2.5-flash", &msgs);
        let stable = hash_conversation_for_account("gemini-web-abc", "gemini-2.5-flash", &msgs);
        let legacy = hash_conversation_for_account("acct", "gemini-2.5-flash", &msgs);
        assert_ne!(global, stable);
        assert_ne!(stable, legacy);
    }

    #[test]
    fn model_salt_separates_hashes() {
        let msgs = stored(&[Message::user("hi"), Message::assistant("hello")]);
        assert_ne!(
            hash_conversation("gemini-2.5-flash", &msgs),
            hash_conversation("gemini-2.5-pro", &msgs)
        );
    }

    #[test]
    fn separators_prevent_field_bleed() {
        let a = stored(&[Message::user("ab"), Message::user("c")]);
        let b = stored(&[Message::user("a"), Message::user("bc")]);
        assert_ne!(
            hash_conversation("gemini-2.5-flash", &a),
            hash_conversation("gemini-2.5-flash", &b)
        );
    }

    #[test]
    fn sanitized_input_hashes_like_resanitized_input() {
        let msgs = vec![
            Message::user("q"),
            Message::assistant("a"),
            Message::assistant("b"),
        ];
        let once = sanitize_assistant_messages(&msgs);
        let twice = sanitize_assistant_messages(&once);
        assert_eq!(
            hash_conversation_for_account("id", "gemini-2.5-flash", &stored(&once)),
            hash_conversation_for_account("id", "gemini-2.5-flash", &stored(&twice))
        );
    }

    #[test]
    fn account_meta_key_shape() {
        assert_eq!(
            account_meta_key("acct", "gemini-2.5-pro"),
            "account-meta|acct|gemini-2.5-pro"
        );
    }
}
