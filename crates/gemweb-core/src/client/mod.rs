//! Upstream client contract
//!
//! The concrete HTTP transport (cookies, rotation, streaming decode) lives
//! outside this crate. The account layer drives it through the
//! [`UpstreamClient`] trait; tests substitute a mock.

mod files;

pub use files::{materialize_inline_files, UploadGuard};

use crate::error::GemWebResult;
use crate::models::{Gem, Model};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Credential snapshot for one upstream account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebTokenStorage {
    /// Primary session cookie; also the source of the stable client id
    pub secure_1psid: String,
    /// Rotating secondary cookie
    pub secure_1psidts: String,
    /// Optional human-facing label
    #[serde(default)]
    pub label: String,
}

/// An image attached to a candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub alt: String,
}

/// One response candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    #[serde(default)]
    pub generated_images: Vec<Image>,
    #[serde(default)]
    pub web_images: Vec<Image>,
}

impl Candidate {
    /// Whether the candidate carries images but no text
    pub fn is_image_only(&self) -> bool {
        self.text.trim().is_empty()
            && (!self.generated_images.is_empty() || !self.web_images.is_empty())
    }
}

/// Output of a single upstream call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelOutput {
    pub candidates: Vec<Candidate>,
    /// Index of the candidate the upstream selected
    pub chosen: usize,
}

impl ModelOutput {
    /// The selected candidate, if any
    pub fn chosen_candidate(&self) -> Option<&Candidate> {
        self.candidates.get(self.chosen)
    }

    /// Mutable access to the selected candidate
    pub fn chosen_candidate_mut(&mut self) -> Option<&mut Candidate> {
        self.candidates.get_mut(self.chosen)
    }
}

/// An in-flight upstream chat session
///
/// `metadata` is the opaque session handle; the client implementation
/// updates it after every send so it can be persisted for resumption.
#[derive(Debug, Clone)]
pub struct ChatSession {
    model: Model,
    gem: Option<Gem>,
    metadata: Vec<String>,
    requested_model: String,
}

impl ChatSession {
    pub fn new(model: Model, gem: Option<Gem>, metadata: Vec<String>) -> Self {
        Self {
            model,
            gem,
            metadata,
            requested_model: String::new(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn gem(&self) -> Option<&Gem> {
        self.gem.as_ref()
    }

    /// The current session handle
    pub fn metadata(&self) -> &[String] {
        &self.metadata
    }

    /// Replace the session handle; called by the client after a send
    pub fn set_metadata(&mut self, metadata: Vec<String>) {
        self.metadata = metadata;
    }

    /// Remember the client-facing alias the request used
    pub fn set_requested_model(&mut self, alias: impl Into<String>) {
        self.requested_model = alias.into();
    }

    pub fn requested_model(&self) -> &str {
        &self.requested_model
    }
}

/// Contract the account layer drives the upstream transport through
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Establish or refresh the transport session
    async fn init(&mut self, timeout: Duration, force_refresh: bool) -> GemWebResult<()>;

    /// Whether the transport session is usable
    fn running(&self) -> bool;

    /// Open a chat session bound to a model, optional gem, and prior
    /// session metadata
    fn start_chat(&self, model: Model, gem: Option<Gem>, metadata: Vec<String>) -> ChatSession;

    /// Send a prompt (splitting oversized payloads as needed) with optional
    /// file attachments; updates the session metadata on success
    async fn send_with_split(
        &self,
        chat: &mut ChatSession,
        prompt: &str,
        files: &[PathBuf],
    ) -> GemWebResult<ModelOutput>;

    /// Rotate the secondary session token, returning the new value
    async fn rotate_ts(&self) -> GemWebResult<String>;
}

/// Builds upstream clients from a credential snapshot
pub trait UpstreamClientFactory: Send + Sync {
    fn create(&self, token: &WebTokenStorage, proxy_url: Option<&str>) -> Box<dyn UpstreamClient>;
}

/// Mask a token for logging, keeping only the edges visible
pub fn mask_token(token: &str) -> String {
    if token.len() <= 8 {
        return "***".to_string();
    }
    format!("{}...{}", &token[..4], &token[token.len() - 4..])
}

/// File extension for a materialized attachment, derived from its MIME type
pub(crate) fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "text/plain" => "txt",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}
