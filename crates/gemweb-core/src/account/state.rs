//! Account state: identities, locks, client lifecycle, and the send path

use super::planner::ChatRequest;
use crate::capture::RequestCapture;
use crate::client::{
    mask_token, ModelOutput, UpstreamClient, UpstreamClientFactory, WebTokenStorage,
};
use crate::config::Config;
use crate::conversation::{
    conv_db_path, load_data, load_store, sha256_hex, stored_to_messages, ConversationRecord,
    Message,
};
use crate::error::{GemWebError, GemWebResult};
use crate::models::IMAGE_PREVIEW_MODEL;
use crate::translate::{Dialect, DialectTranslator, StreamFrames, DONE_SENTINEL};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// A record pre-selected by an out-of-band discovery path, staged for the
/// next request on this account
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub model: String,
    pub record: ConversationRecord,
}

/// Outcome of one upstream call
#[derive(Debug)]
pub struct SendResult {
    pub output: ModelOutput,
    /// Session handle after the call, for callers that track it
    pub session_metadata: Vec<String>,
    pub reuse: bool,
    pub tagged: bool,
    pub prompt: String,
}

/// The cached upstream client lives inside the request mutex so client
/// mutation and upstream calls are serialized together.
pub(crate) struct ClientSlot {
    pub client: Option<Box<dyn UpstreamClient>>,
    pub last_refresh: Option<DateTime<Utc>>,
}

pub(crate) struct TokenState {
    pub storage: WebTokenStorage,
    pub dirty: bool,
}

/// In-memory copies of the three persisted keyspaces
#[derive(Debug, Default, Clone)]
pub(crate) struct ConvCaches {
    /// `account-meta|acct|model` -> metadata strings
    pub store: HashMap<String, Vec<String>>,
    /// primary key -> record
    pub items: HashMap<String, ConversationRecord>,
    /// `hash:<hex>` -> primary key
    pub index: HashMap<String, String>,
}

/// Per-account aggregate owning caches, credentials, and locks
pub struct AccountState {
    pub(crate) cfg: Arc<Config>,
    factory: Arc<dyn UpstreamClientFactory>,
    storage_path: Option<String>,
    auth_label: String,
    token_label: String,
    pub(crate) stable_client_id: String,
    pub(crate) account_id: String,
    conv_path_override: Option<PathBuf>,

    slot: Mutex<ClientSlot>,
    tokens: Mutex<TokenState>,
    pub(crate) conv: RwLock<ConvCaches>,
    pending: Mutex<Option<MatchResult>>,
}

impl AccountState {
    /// Create the state for one account and load its caches from disk
    ///
    /// The stable client id is derived from the primary secret and survives
    /// restarts; the account id is derived from the storage file basename
    /// and doubles as the legacy hash identity.
    pub fn new(
        cfg: Arc<Config>,
        token: WebTokenStorage,
        storage_path: Option<String>,
        auth_label: impl Into<String>,
        factory: Arc<dyn UpstreamClientFactory>,
    ) -> Self {
        Self::build(cfg, token, storage_path, auth_label, factory, None)
    }

    /// Like [`AccountState::new`], with an explicit conversation store path
    ///
    /// Hosts embedding the core use this to keep storage out of the working
    /// directory; tests use it with a temp dir.
    pub fn new_at(
        cfg: Arc<Config>,
        token: WebTokenStorage,
        storage_path: Option<String>,
        auth_label: impl Into<String>,
        factory: Arc<dyn UpstreamClientFactory>,
        conv_path: impl Into<PathBuf>,
    ) -> Self {
        Self::build(
            cfg,
            token,
            storage_path,
            auth_label,
            factory,
            Some(conv_path.into()),
        )
    }

    fn build(
        cfg: Arc<Config>,
        token: WebTokenStorage,
        storage_path: Option<String>,
        auth_label: impl Into<String>,
        factory: Arc<dyn UpstreamClientFactory>,
        conv_path_override: Option<PathBuf>,
    ) -> Self {
        let suffix: String = sha256_hex(&token.secure_1psid).chars().take(16).collect();
        let stable_client_id = format!("gemini-web-{}", suffix);
        let account_id = storage_path
            .as_deref()
            .and_then(|p| Path::new(p).file_stem().and_then(|s| s.to_str()))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| suffix.clone());

        let mut state = Self {
            cfg,
            factory,
            storage_path,
            auth_label: auth_label.into().trim().to_string(),
            token_label: token.label.trim().to_string(),
            stable_client_id,
            account_id,
            conv_path_override,
            slot: Mutex::new(ClientSlot {
                client: None,
                last_refresh: None,
            }),
            tokens: Mutex::new(TokenState {
                storage: token,
                dirty: false,
            }),
            conv: RwLock::new(ConvCaches::default()),
            pending: Mutex::new(None),
        };
        state.load_conversation_caches();
        state
    }

    /// Stable account label for logging and persistence keys
    pub fn label(&self) -> String {
        if !self.token_label.is_empty() {
            return self.token_label.clone();
        }
        if !self.auth_label.is_empty() {
            return self.auth_label.clone();
        }
        if let Some(path) = &self.storage_path {
            if let Some(base) = Path::new(path).file_stem().and_then(|s| s.to_str()) {
                if !base.is_empty() {
                    return base.to_string();
                }
            }
        }
        self.stable_client_id.clone()
    }

    pub fn stable_client_id(&self) -> &str {
        &self.stable_client_id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub(crate) fn conv_path(&self) -> PathBuf {
        if let Some(path) = &self.conv_path_override {
            return path.clone();
        }
        let base = self
            .storage_path
            .clone()
            .unwrap_or_else(|| self.account_id.clone());
        conv_db_path(&base)
    }

    fn load_conversation_caches(&mut self) {
        let path = self.conv_path();
        let mut caches = ConvCaches::default();
        if let Ok(store) = load_store(&path) {
            caches.store = store;
        }
        if let Ok((items, index)) = load_data(&path) {
            caches.items = items;
            caches.index = index;
        }
        self.conv = RwLock::new(caches);
    }

    /// Stage a match for the next request on this account
    pub async fn set_pending_match(&self, m: MatchResult) {
        let mut pending = self.pending.lock().await;
        *pending = Some(m);
    }

    /// Take the staged match, clearing the slot regardless of usability
    pub(crate) async fn consume_pending_match(&self) -> Option<MatchResult> {
        self.pending.lock().await.take()
    }

    /// Deep copy of the credential snapshot for the external token store
    pub async fn token_snapshot(&self) -> WebTokenStorage {
        self.tokens.lock().await.storage.clone()
    }

    /// Whether a rotation is waiting to be persisted; clears the flag
    pub async fn take_token_dirty(&self) -> bool {
        let mut tokens = self.tokens.lock().await;
        std::mem::take(&mut tokens.dirty)
    }

    /// When the upstream client was last (re)created
    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.slot.lock().await.last_refresh
    }

    async fn ensure_client(&self, slot: &mut ClientSlot) -> GemWebResult<()> {
        if slot.client.as_ref().is_some_and(|c| c.running()) {
            return Ok(());
        }
        let token = self.token_snapshot().await;
        let mut client = self.factory.create(&token, self.cfg.proxy_url.as_deref());
        client.init(DEFAULT_UPSTREAM_TIMEOUT, false).await?;
        slot.client = Some(client);
        slot.last_refresh = Some(Utc::now());
        Ok(())
    }

    /// Recreate the upstream client and proactively rotate the session
    /// token so the new value persists sooner. Rotation failures are
    /// non-fatal.
    pub async fn refresh(&self) -> GemWebResult<()> {
        let mut slot = self.slot.lock().await;
        let token = self.token_snapshot().await;
        let mut client = self.factory.create(&token, self.cfg.proxy_url.as_deref());
        client.init(DEFAULT_UPSTREAM_TIMEOUT, false).await?;

        match client.rotate_ts().await {
            Ok(new_ts) if !new_ts.is_empty() => {
                let mut tokens = self.tokens.lock().await;
                if new_ts != tokens.storage.secure_1psidts {
                    tokens.storage.secure_1psidts = new_ts.clone();
                    tokens.dirty = true;
                    tracing::debug!(
                        account = %self.label(),
                        token = %mask_token(&new_ts),
                        "rotated upstream session token"
                    );
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(account = %self.label(), error = %err, "token rotation failed");
            }
        }

        slot.client = Some(client);
        slot.last_refresh = Some(Utc::now());
        Ok(())
    }

    /// Recover the stored history of the record carrying exactly this
    /// metadata handle for the given model
    pub(crate) async fn find_conversation_by_metadata(
        &self,
        model: &str,
        metadata: &[String],
    ) -> Option<Vec<Message>> {
        if metadata.is_empty() {
            return None;
        }
        let conv = self.conv.read().await;
        for rec in conv.items.values() {
            if !rec.model.trim().eq_ignore_ascii_case(model.trim()) {
                continue;
            }
            if rec.metadata != metadata {
                continue;
            }
            return Some(stored_to_messages(&rec.messages));
        }
        None
    }

    /// Run one request against the upstream
    ///
    /// Serialized per account: planning, the upstream call, and persistence
    /// all happen under the request mutex, so a reader entering after this
    /// returns observes the new cache state. Cancellation aborts the
    /// upstream call without any cache write.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        model_name: &str,
        request: ChatRequest,
        capture: Option<&RequestCapture>,
    ) -> GemWebResult<SendResult> {
        let mut slot = self.slot.lock().await;

        let prep = self.prepare(model_name, &request, capture).await?;
        self.ensure_client(&mut slot).await?;
        let client = slot
            .client
            .as_ref()
            .ok_or_else(|| GemWebError::upstream("upstream client unavailable"))?;

        let mut chat = client.start_chat(prep.model.clone(), prep.gem.clone(), prep.metadata.clone());
        chat.set_requested_model(model_name);

        let mut output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GemWebError::Cancelled),
            result = client.send_with_split(&mut chat, &prep.prompt, prep.uploads.paths()) => result?,
        };

        apply_image_only_fallback(&prep.underlying, &mut output);

        if self.cfg.request_log {
            if let Some(capture) = capture {
                if let Ok(encoded) = serde_json::to_vec(&output) {
                    capture.append_response_chunk(&encoded);
                }
            }
        }

        let session_metadata = chat.metadata().to_vec();
        self.persist_conversation(model_name, &prep, &chat, &output).await;
        drop(slot);

        Ok(SendResult {
            output,
            session_metadata,
            reuse: prep.reuse,
            tagged: prep.tagged,
            prompt: prep.prompt,
        })
    }

    /// Convert a complete upstream response into the caller's dialect
    ///
    /// OpenAI-dialect responses get a fresh `chatcmpl-` id.
    pub fn convert_response(
        &self,
        translator: &dyn DialectTranslator,
        dialect: Dialect,
        model_name: &str,
        upstream: &[u8],
    ) -> String {
        if !translator.needs_convert(dialect) {
            return String::from_utf8_lossy(upstream).into_owned();
        }
        let out = translator.response_non_stream(dialect, model_name, upstream);
        if dialect == Dialect::OpenAi && !out.is_empty() {
            if let Ok(mut value) = serde_json::from_str::<serde_json::Value>(&out) {
                if value.get("id").is_some() {
                    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default() as i128;
                    value["id"] = serde_json::Value::String(crate::translate::openai_response_id(nanos));
                    if let Ok(rewritten) = serde_json::to_string(&value) {
                        return rewritten;
                    }
                }
            }
        }
        out
    }

    /// Convert one upstream chunk into dialect frames
    pub fn convert_stream_chunk(
        &self,
        translator: &dyn DialectTranslator,
        dialect: Dialect,
        model_name: &str,
        chunk: &[u8],
    ) -> Vec<String> {
        if !translator.needs_convert(dialect) {
            return vec![String::from_utf8_lossy(chunk).into_owned()];
        }
        translator.response_stream(dialect, model_name, chunk)
    }

    /// Produce the terminal frames of a converted stream
    pub fn finish_stream(
        &self,
        translator: &dyn DialectTranslator,
        dialect: Dialect,
        model_name: &str,
    ) -> StreamFrames {
        let mut frames = StreamFrames::new();
        if translator.needs_convert(dialect) {
            frames.push_frames(translator.response_stream(
                dialect,
                model_name,
                DONE_SENTINEL.as_bytes(),
            ));
        }
        frames.finish();
        frames
    }
}

/// For the image preview model, an image-only candidate gets fixed fallback
/// text so the stored and sent text agree and hashes stay deterministic.
fn apply_image_only_fallback(underlying: &str, output: &mut ModelOutput) {
    if !underlying.trim().eq_ignore_ascii_case(IMAGE_PREVIEW_MODEL) {
        return;
    }
    if let Some(candidate) = output.chosen_candidate_mut() {
        if candidate.is_image_only() {
            candidate.text = "Done".to_string();
        }
    }
}
