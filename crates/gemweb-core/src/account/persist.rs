//! Persistence orchestration after a successful upstream call
//!
//! The account metadata keyspace is overwritten on every call that yields
//! session metadata. When reusable context is enabled, a conversation
//! record is built from the synthetic full history plus the latest
//! assistant turn and indexed under every qualifying suffix segment for
//! both the stable and the legacy account identities. Write failures are
//! logged and swallowed; the in-memory caches stay authoritative.

use super::planner::Prepared;
use super::state::AccountState;
use crate::client::{ChatSession, ModelOutput};
use crate::conversation::{
    account_meta_key, hash_conversation_for_account, normalize_role, remove_think_tags,
    sanitize_assistant_messages, save_data, save_store, stored_to_messages, to_stored_messages,
    ConversationRecord, Message,
};
use chrono::Utc;
use std::collections::HashSet;

/// Build the record for a completed call; `None` when the output carries no
/// candidates
fn build_conversation_record(
    model: &str,
    client_id: &str,
    history: &[Message],
    output: &ModelOutput,
    metadata: Vec<String>,
) -> Option<ConversationRecord> {
    let candidate = output.chosen_candidate()?;
    let text = remove_think_tags(&candidate.text);
    let mut messages = history.to_vec();
    messages.push(Message::assistant(text));
    let now = Utc::now();
    Some(ConversationRecord {
        model: model.to_string(),
        client_id: client_id.to_string(),
        metadata,
        messages: to_stored_messages(&messages),
        created_at: now,
        updated_at: now,
    })
}

impl AccountState {
    /// Record the outcome of a successful upstream call
    pub(crate) async fn persist_conversation(
        &self,
        model_name: &str,
        prep: &Prepared,
        chat: &ChatSession,
        output: &ModelOutput,
    ) {
        let metadata = chat.metadata().to_vec();
        if !metadata.is_empty() {
            let key_underlying = account_meta_key(&self.account_id, &prep.underlying);
            let key_alias = account_meta_key(&self.account_id, model_name);
            let snapshot = {
                let mut conv = self.conv.write().await;
                conv.store.insert(key_underlying, metadata.clone());
                conv.store.insert(key_alias, metadata.clone());
                conv.store.clone()
            };
            if let Err(err) = save_store(&self.conv_path(), &snapshot) {
                tracing::warn!(
                    account = %self.label(),
                    error = %err,
                    "failed to persist account metadata"
                );
            }
        }

        if !self.cfg.use_reusable_context() {
            return;
        }
        let Some(rec) = build_conversation_record(
            &prep.underlying,
            &self.stable_client_id,
            &prep.full_history,
            output,
            metadata,
        ) else {
            return;
        };

        let stable_hash =
            hash_conversation_for_account(&rec.client_id, &prep.underlying, &rec.messages);
        let account_hash =
            hash_conversation_for_account(&self.account_id, &prep.underlying, &rec.messages);

        let (items_snapshot, index_snapshot) = {
            let mut conv = self.conv.write().await;
            let mut seen: HashSet<String> = HashSet::new();

            conv.items.insert(stable_hash.clone(), rec.clone());
            conv.index
                .insert(format!("hash:{}", stable_hash), stable_hash.clone());
            seen.insert(format!("hash:{}", stable_hash));
            if account_hash != stable_hash {
                conv.index
                    .insert(format!("hash:{}", account_hash), stable_hash.clone());
                seen.insert(format!("hash:{}", account_hash));
            }

            // Index every qualifying suffix segment so a future request
            // whose history starts mid-conversation still resolves.
            let sanitized = sanitize_assistant_messages(&stored_to_messages(&rec.messages));
            for start in 1..sanitized.len() {
                let segment = &sanitized[start..];
                if segment.len() < 2 {
                    continue;
                }
                let tail = normalize_role(&segment[segment.len() - 1].role);
                if tail != "assistant" && tail != "system" {
                    continue;
                }
                let stored_segment = to_stored_messages(segment);
                for id in [rec.client_id.as_str(), self.account_id.as_str()] {
                    let hash =
                        hash_conversation_for_account(id, &prep.underlying, &stored_segment);
                    let key = format!("hash:{}", hash);
                    if seen.insert(key.clone()) {
                        conv.index.insert(key, stable_hash.clone());
                    }
                }
            }

            (conv.items.clone(), conv.index.clone())
        };

        if let Err(err) = save_data(&self.conv_path(), &items_snapshot, &index_snapshot) {
            tracing::warn!(
                account = %self.label(),
                error = %err,
                "failed to persist conversation data"
            );
        }
    }
}
