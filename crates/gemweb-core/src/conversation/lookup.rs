//! Lookup engine over the in-memory conversation keyspaces
//!
//! Lookups run against the items map (primary key to record) and the index
//! map (`hash:<hex>` to primary key). Each probe tries the stable client id
//! first and the legacy account identifier second, through the index
//! indirection and then as a direct item key. Orphaned index entries simply
//! fail to resolve and are harmless.

use super::hashing::{hash_conversation, hash_conversation_for_account};
use super::message::{
    normalize_role, sanitize_assistant_messages, to_stored_messages, ConversationRecord, Message,
};
use crate::models::normalize_model;
use std::collections::{HashMap, HashSet};

/// A hash candidate for a specific prefix length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixHash {
    pub hash: String,
    pub prefix_len: usize,
}

fn qualifying_tail(role: &str) -> bool {
    let r = normalize_role(role);
    r == "assistant" || r == "system"
}

/// Enumerate global-scope hash candidates from longest to shortest prefix
///
/// Only prefixes ending in a completed turn qualify. Used by out-of-band
/// index callers to probe for a known conversation.
pub fn build_lookup_hashes(model: &str, msgs: &[Message]) -> Vec<PrefixHash> {
    if msgs.len() < 2 {
        return Vec::new();
    }
    let model = normalize_model(model);
    let sanitized = sanitize_assistant_messages(msgs);
    let mut result = Vec::with_capacity(sanitized.len());
    for end in (2..=sanitized.len()).rev() {
        if !qualifying_tail(&sanitized[end - 1].role) {
            continue;
        }
        let hash = hash_conversation(&model, &to_stored_messages(&sanitized[..end]));
        result.push(PrefixHash {
            hash,
            prefix_len: end,
        });
    }
    result
}

/// Enumerate global-scope hashes covering the full snapshot and every
/// qualifying suffix segment, deduplicated
pub fn build_storage_hashes(model: &str, msgs: &[Message]) -> Vec<PrefixHash> {
    if msgs.is_empty() {
        return Vec::new();
    }
    let model = normalize_model(model);
    let sanitized = sanitize_assistant_messages(msgs);
    if sanitized.is_empty() {
        return Vec::new();
    }
    let mut result = Vec::with_capacity(sanitized.len());
    let mut seen = HashSet::with_capacity(sanitized.len());
    for start in 0..sanitized.len() {
        let segment = &sanitized[start..];
        if segment.len() < 2 {
            continue;
        }
        if !qualifying_tail(&segment[segment.len() - 1].role) {
            continue;
        }
        let hash = hash_conversation(&model, &to_stored_messages(segment));
        if seen.insert(hash.clone()) {
            result.push(PrefixHash {
                hash,
                prefix_len: segment.len(),
            });
        }
    }
    if result.is_empty() {
        let hash = hash_conversation(&model, &to_stored_messages(&sanitized));
        return vec![PrefixHash {
            hash,
            prefix_len: sanitized.len(),
        }];
    }
    result
}

fn find_by_message_hash(
    items: &HashMap<String, ConversationRecord>,
    index: &HashMap<String, String>,
    stable_client_id: &str,
    legacy_id: &str,
    model: &str,
    msgs: &[Message],
) -> Option<String> {
    let stored = to_stored_messages(msgs);
    let stable_hash = hash_conversation_for_account(stable_client_id, model, &stored);
    let legacy_hash = hash_conversation_for_account(legacy_id, model, &stored);

    for hash in [stable_hash, legacy_hash] {
        if let Some(key) = index.get(&format!("hash:{}", hash)) {
            if items.contains_key(key) {
                return Some(key.clone());
            }
        }
        if items.contains_key(&hash) {
            return Some(hash);
        }
    }
    None
}

/// Find the primary key of the record whose stored messages equal `msgs`,
/// trying the exact list first and its sanitized form second
pub fn find_conversation_key(
    items: &HashMap<String, ConversationRecord>,
    index: &HashMap<String, String>,
    stable_client_id: &str,
    legacy_id: &str,
    model: &str,
    msgs: &[Message],
) -> Option<String> {
    if msgs.is_empty() {
        return None;
    }
    if let Some(key) = find_by_message_hash(items, index, stable_client_id, legacy_id, model, msgs)
    {
        return Some(key);
    }
    find_by_message_hash(
        items,
        index,
        stable_client_id,
        legacy_id,
        model,
        &sanitize_assistant_messages(msgs),
    )
}

/// Find the longest prefix of `msgs` ending in a completed turn that
/// matches a stored session. Returns the key and the overlap length.
///
/// Walking from the longest prefix downward makes the first hit maximal;
/// longer prefixes hash to different values, so ties cannot occur.
pub fn find_reusable_session_key(
    items: &HashMap<String, ConversationRecord>,
    index: &HashMap<String, String>,
    stable_client_id: &str,
    legacy_id: &str,
    model: &str,
    msgs: &[Message],
) -> Option<(String, usize)> {
    if msgs.len() < 2 {
        return None;
    }
    for end in (2..=msgs.len()).rev() {
        if !qualifying_tail(&msgs[end - 1].role) {
            continue;
        }
        if let Some(key) = find_conversation_key(
            items,
            index,
            stable_client_id,
            legacy_id,
            model,
            &msgs[..end],
        ) {
            return Some((key, end));
        }
    }
    None
}

/// Record-returning variant of [`find_conversation_key`]
pub fn find_conversation_in<'a>(
    items: &'a HashMap<String, ConversationRecord>,
    index: &HashMap<String, String>,
    stable_client_id: &str,
    legacy_id: &str,
    model: &str,
    msgs: &[Message],
) -> Option<&'a ConversationRecord> {
    let key = find_conversation_key(items, index, stable_client_id, legacy_id, model, msgs)?;
    items.get(&key)
}

/// Record-returning variant of [`find_reusable_session_key`]
///
/// Returns the record, its metadata, and the overlap length.
pub fn find_reusable_session_in<'a>(
    items: &'a HashMap<String, ConversationRecord>,
    index: &HashMap<String, String>,
    stable_client_id: &str,
    legacy_id: &str,
    model: &str,
    msgs: &[Message],
) -> Option<(&'a ConversationRecord, Vec<String>, usize)> {
    let (key, overlap) =
        find_reusable_session_key(items, index, stable_client_id, legacy_id, model, msgs)?;
    let rec = items.get(&key)?;
    Some((rec, rec.metadata.clone(), overlap))
}
