//! Reuse planning
//!
//! Given a fresh incoming message list, decide whether a stored session can
//! be resumed, how much of the list it already covers, and what suffix,
//! metadata, and attachments the upstream call should carry.

use super::state::AccountState;
use crate::capture::RequestCapture;
use crate::client::{materialize_inline_files, UploadGuard};
use crate::conversation::{
    account_meta_key, append_xml_wrap_hint_if_needed, build_prompt, equal_messages,
    find_reusable_session_in, need_role_tags, normalize_role, sanitize_assistant_messages,
    stored_to_messages, Message,
};
use crate::error::{GemWebError, GemWebResult};
use crate::models::{map_alias_to_underlying, model_from_name, Gem, Model};

/// A parsed request: messages plus attachments aligned to message indices
///
/// `msg_file_idx[i]` lists the indices into `files`/`mimes` attached to
/// message `i`. Request parsing itself is a translation-layer concern.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub files: Vec<Vec<u8>>,
    pub mimes: Vec<String>,
    pub msg_file_idx: Vec<Vec<usize>>,
}

impl ChatRequest {
    /// A request carrying only messages
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

/// Everything the send path needs after planning
#[derive(Debug)]
pub struct Prepared {
    /// Canonical underlying model name
    pub underlying: String,
    pub model: Model,
    pub gem: Option<Gem>,
    /// Session handle to resume with; empty means a fresh session
    pub metadata: Vec<String>,
    pub prompt: String,
    pub tagged: bool,
    pub reuse: bool,
    /// Synthetic full history the resulting record will be built from
    pub full_history: Vec<Message>,
    pub uploads: UploadGuard,
}

/// A resumable session the planner selected
pub(crate) struct ReusePlan {
    pub metadata: Vec<String>,
    pub history: Vec<Message>,
    pub overlap: usize,
}

/// Largest `k` such that the last `k` stored messages equal the first `k`
/// incoming messages
pub(crate) fn longest_history_overlap(history: &[Message], incoming: &[Message]) -> usize {
    let max = history.len().min(incoming.len());
    for overlap in (1..=max).rev() {
        if equal_messages(&history[history.len() - overlap..], &incoming[..overlap]) {
            return overlap;
        }
    }
    0
}

impl AccountState {
    /// Plan and assemble one request
    pub(crate) async fn prepare(
        &self,
        model_name: &str,
        request: &ChatRequest,
        capture: Option<&RequestCapture>,
    ) -> GemWebResult<Prepared> {
        if self.cfg.request_log {
            if let Some(capture) = capture {
                if let Ok(encoded) = serde_json::to_vec(&request.messages) {
                    capture.record_request(&encoded);
                }
            }
        }

        let cleaned = sanitize_assistant_messages(&request.messages);
        let underlying = map_alias_to_underlying(model_name);
        let model = model_from_name(&underlying)?;

        let mut metadata: Vec<String> = Vec::new();
        let mut use_msgs = cleaned.clone();
        let mut full_history = cleaned.clone();
        let mut reuse = false;
        // None means attachments are dropped entirely.
        let mut attachments: Option<(Vec<Vec<u8>>, Vec<String>)> =
            Some((request.files.clone(), request.mimes.clone()));

        if self.cfg.use_reusable_context() {
            let plan = match self.reuse_from_pending(&underlying, &cleaned).await {
                Some(plan) => Some(plan),
                None => self.find_reusable_session(&underlying, &cleaned).await,
            };
            if let Some(plan) = plan {
                reuse = true;
                metadata = plan.metadata;
                let overlap = plan.overlap.min(cleaned.len());
                let delta: Vec<Message> = cleaned[overlap..].to_vec();
                full_history = if plan.history.is_empty() {
                    cleaned[..overlap]
                        .iter()
                        .chain(delta.iter())
                        .cloned()
                        .collect()
                } else {
                    plan.history.iter().chain(delta.iter()).cloned().collect()
                };
                use_msgs = if delta.is_empty() && !cleaned.is_empty() {
                    // Re-ask with the last message; the session already
                    // holds the full history.
                    vec![cleaned[cleaned.len() - 1].clone()]
                } else {
                    delta
                };
                attachments = select_reuse_attachments(request, use_msgs.len());
                tracing::debug!(
                    account = %self.label(),
                    model = %underlying,
                    overlap,
                    delta = use_msgs.len(),
                    "resuming stored session"
                );
            } else if cleaned.len() >= 2
                && normalize_role(&cleaned[cleaned.len() - 2].role) == "assistant"
            {
                // Degenerate fallback: the client clearly continues some
                // session we no longer recognize; reuse the most recent
                // metadata for this (account, model) if any.
                if let Some(fallback) = self.account_meta(&underlying, model_name).await {
                    metadata = fallback;
                    use_msgs = vec![cleaned[cleaned.len() - 1].clone()];
                    reuse = true;
                    attachments = None;
                }
            }
        } else {
            metadata = self
                .account_meta(&underlying, model_name)
                .await
                .unwrap_or_default();
        }

        let mut tagged = need_role_tags(&use_msgs);
        if reuse && use_msgs.len() == 1 {
            tagged = false;
        }

        let hint_disabled = !self.cfg.gemini_web.code_mode;
        let use_msgs = append_xml_wrap_hint_if_needed(&use_msgs, hint_disabled);

        let prompt = build_prompt(&use_msgs, tagged, tagged);
        if prompt.trim().is_empty() {
            return Err(GemWebError::invalid_input(
                "empty prompt after filtering system/thought content",
            ));
        }

        let uploads = match attachments {
            Some((files, mimes)) => materialize_inline_files(&files, &mimes)?,
            None => UploadGuard::default(),
        };

        let gem = if self.cfg.gemini_web.code_mode {
            Some(Gem::coding_partner())
        } else {
            None
        };

        Ok(Prepared {
            underlying,
            model,
            gem,
            metadata,
            prompt,
            tagged,
            reuse,
            full_history,
            uploads,
        })
    }

    /// Most recent metadata for this account and model, preferring the
    /// underlying name over the client-facing alias
    async fn account_meta(&self, underlying: &str, alias: &str) -> Option<Vec<String>> {
        let key_underlying = account_meta_key(&self.account_id, underlying);
        let key_alias = account_meta_key(&self.account_id, alias);
        let conv = self.conv.read().await;
        conv.store
            .get(&key_underlying)
            .filter(|v| !v.is_empty())
            .or_else(|| conv.store.get(&key_alias).filter(|v| !v.is_empty()))
            .cloned()
    }

    /// Try the staged pending match. The slot is consumed either way.
    pub(crate) async fn reuse_from_pending(
        &self,
        underlying: &str,
        msgs: &[Message],
    ) -> Option<ReusePlan> {
        let staged = self.consume_pending_match().await?;
        if !staged
            .model
            .trim()
            .eq_ignore_ascii_case(underlying.trim())
        {
            return None;
        }
        let metadata = staged.record.metadata.clone();
        if metadata.is_empty() {
            return None;
        }
        let history = self
            .find_conversation_by_metadata(underlying, &metadata)
            .await?;
        let overlap = longest_history_overlap(&history, msgs);
        Some(ReusePlan {
            metadata,
            history,
            overlap,
        })
    }

    /// Search the index for the longest resumable prefix
    pub(crate) async fn find_reusable_session(
        &self,
        underlying: &str,
        msgs: &[Message],
    ) -> Option<ReusePlan> {
        let conv = self.conv.read().await;
        let (rec, metadata, engine_overlap) = find_reusable_session_in(
            &conv.items,
            &conv.index,
            &self.stable_client_id,
            &self.account_id,
            underlying,
            msgs,
        )?;
        let history = stored_to_messages(&rec.messages);
        drop(conv);
        if history.is_empty() {
            return None;
        }
        // The stored history is authoritative. An engine hit whose history
        // does not actually align with the incoming list means a hash
        // collision or a sanitized-form mismatch; do not guess.
        let overlap = longest_history_overlap(&history, msgs);
        if overlap == 0 {
            tracing::debug!(
                account = %self.label(),
                engine_overlap,
                "stored history does not align with incoming messages, skipping reuse"
            );
            return None;
        }
        Some(ReusePlan {
            metadata,
            history,
            overlap,
        })
    }
}

/// On single-message reuse, keep only the files attached to the original
/// last message; the session already has everything older. Any other reuse
/// shape drops attachments.
fn select_reuse_attachments(
    request: &ChatRequest,
    use_len: usize,
) -> Option<(Vec<Vec<u8>>, Vec<String>)> {
    if use_len != 1
        || request.messages.is_empty()
        || request.msg_file_idx.len() != request.messages.len()
    {
        return None;
    }
    let idxs = &request.msg_file_idx[request.msg_file_idx.len() - 1];
    if idxs.is_empty() {
        return None;
    }
    let mut files = Vec::with_capacity(idxs.len());
    let mut mimes = Vec::with_capacity(idxs.len());
    for &fi in idxs {
        if fi < request.files.len() {
            files.push(request.files[fi].clone());
            mimes.push(request.mimes.get(fi).cloned().unwrap_or_default());
        }
    }
    Some((files, mimes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_finds_the_largest_suffix_prefix_match() {
        let history = vec![
            Message::user("a"),
            Message::assistant("b"),
            Message::user("c"),
            Message::assistant("d"),
        ];
        let incoming = vec![
            Message::user("c"),
            Message::assistant("d"),
            Message::user("e"),
        ];
        assert_eq!(longest_history_overlap(&history, &incoming), 2);
    }

    #[test]
    fn overlap_is_zero_when_nothing_aligns() {
        let history = vec![Message::user("a"), Message::assistant("b")];
        let incoming = vec![Message::user("x")];
        assert_eq!(longest_history_overlap(&history, &incoming), 0);
    }

    #[test]
    fn overlap_covers_full_continuation() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let incoming = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("more"),
        ];
        assert_eq!(longest_history_overlap(&history, &incoming), 2);
    }

    #[test]
    fn attachment_selection_keeps_last_message_files_only() {
        let request = ChatRequest {
            messages: vec![Message::user("old"), Message::user("new")],
            files: vec![b"f0".to_vec(), b"f1".to_vec(), b"f2".to_vec()],
            mimes: vec![
                "image/png".to_string(),
                "image/jpeg".to_string(),
                "text/plain".to_string(),
            ],
            msg_file_idx: vec![vec![0], vec![1, 2]],
        };
        let (files, mimes) = select_reuse_attachments(&request, 1).unwrap();
        assert_eq!(files, vec![b"f1".to_vec(), b"f2".to_vec()]);
        assert_eq!(mimes, vec!["image/jpeg", "text/plain"]);

        assert!(select_reuse_attachments(&request, 2).is_none());

        let no_files = ChatRequest {
            msg_file_idx: vec![vec![0], vec![]],
            ..request
        };
        assert!(select_reuse_attachments(&no_files, 1).is_none());
    }
}
