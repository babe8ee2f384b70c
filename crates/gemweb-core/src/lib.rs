//! Gemini web bridge core
//!
//! This crate is the conversation reuse and persistence core of a provider
//! adapter that bridges an OpenAI/Gemini-style chat API to the Gemini web
//! upstream. The upstream has no stateless completions endpoint; every
//! conversation is a server-side session identified by opaque metadata
//! strings. The core recognizes when an incoming message list continues a
//! session it has already seen, resumes that session by sending only the
//! new suffix, and persists enough state to recognize future continuations
//! across restarts and across identifier schemes.
//!
//! # Key Components
//!
//! - [`conversation`] - canonical message forms, prefix hashing, prompt
//!   assembly, the lookup engine, and the durable store
//! - [`account`] - per-account state: identities, locks, the reuse
//!   planner, the send pipeline, and persistence orchestration
//! - [`client`] - the contract the concrete upstream transport implements
//! - [`models`] - alias mapping and model validation
//! - [`translate`] - the dialect translation seam and streaming frames
//! - [`config`] / [`error`] / [`capture`] - ambient concerns
//!
//! # Example
//!
//! ```no_run
//! use gemweb_core::account::{AccountState, ChatRequest};
//! use gemweb_core::client::WebTokenStorage;
//! use gemweb_core::config::Config;
//! use gemweb_core::conversation::Message;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(factory: Arc<dyn gemweb_core::client::UpstreamClientFactory>) -> gemweb_core::error::GemWebResult<()> {
//! let token = WebTokenStorage::default();
//! let state = AccountState::new(
//!     Arc::new(Config::default()),
//!     token,
//!     Some("tokens/alice.json".to_string()),
//!     "",
//!     factory,
//! );
//! let cancel = CancellationToken::new();
//! let request = ChatRequest::from_messages(vec![Message::user("hi")]);
//! let result = state.send(&cancel, "gemini-2.5-flash", request, None).await?;
//! println!("{}", result.output.chosen_candidate().map(|c| c.text.as_str()).unwrap_or(""));
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod capture;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod models;
pub mod translate;

pub use account::{AccountState, ChatRequest, MatchResult, SendResult};
pub use capture::RequestCapture;
pub use client::{ModelOutput, UpstreamClient, UpstreamClientFactory, WebTokenStorage};
pub use config::Config;
pub use conversation::{ConversationRecord, Message, StoredMessage};
pub use error::{GemWebError, GemWebResult};
