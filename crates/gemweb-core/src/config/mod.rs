//! Configuration for the Gemini web bridge core
//!
//! All fields support `serde(default)` so partial configuration files merge
//! with defaults.

use serde::{Deserialize, Serialize};

/// Main configuration handle shared by all account states
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP proxy to route upstream calls through
    pub proxy_url: Option<String>,
    /// Capture upstream request/response payloads into request-scoped storage
    pub request_log: bool,
    /// Gemini web specific knobs
    pub gemini_web: GeminiWebConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_url: None,
            request_log: false,
            gemini_web: GeminiWebConfig::default(),
        }
    }
}

/// Knobs specific to the Gemini web upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiWebConfig {
    /// Enables the reusable-context path. When false, only the account
    /// metadata fallback is consulted.
    pub context: bool,
    /// Enables the XML-wrap hint and selects the coding gem identity
    pub code_mode: bool,
}

impl Default for GeminiWebConfig {
    fn default() -> Self {
        Self {
            context: true,
            code_mode: false,
        }
    }
}

impl Config {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the reusable-context path is enabled
    pub fn use_reusable_context(&self) -> bool {
        self.gemini_web.context
    }
}
