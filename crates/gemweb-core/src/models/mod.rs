//! Upstream model names, alias mapping, and gem identities
//!
//! The planner, the hashes, and the persisted records all work against the
//! canonical upstream model name. Client-facing aliases are mapped to
//! canonical form before anything else touches them.

use crate::error::{GemWebError, GemWebResult};
use serde::{Deserialize, Serialize};

/// Canonical model that returns image-only candidates needing fallback text
pub const IMAGE_PREVIEW_MODEL: &str = "gemini-2.5-flash-image-preview";

/// Canonical model names the upstream serves
const KNOWN_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-2.5-flash-image-preview",
];

/// Client-facing aliases that do not follow the `-web` suffix convention
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("gemini-pro-web", "gemini-2.5-pro"),
    ("gemini-flash-web", "gemini-2.5-flash"),
];

/// A validated upstream model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    name: String,
}

impl Model {
    /// Canonical upstream name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A predefined upstream gem identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gem {
    pub id: String,
    pub name: String,
    pub predefined: bool,
}

impl Gem {
    /// The gem selected when code mode is enabled
    pub fn coding_partner() -> Self {
        Self {
            id: "coding-partner".to_string(),
            name: "Coding partner".to_string(),
            predefined: true,
        }
    }
}

/// Trim a model name to canonical comparison form
pub fn normalize_model(model: &str) -> String {
    model.trim().to_string()
}

/// Map a client-facing alias to the canonical underlying model name
///
/// Known aliases come first, then the `-web` suffix convention; anything
/// else passes through trimmed so unknown names fail validation later with
/// a useful message.
pub fn map_alias_to_underlying(alias: &str) -> String {
    let trimmed = alias.trim();
    for (from, to) in MODEL_ALIASES {
        if trimmed.eq_ignore_ascii_case(from) {
            return (*to).to_string();
        }
    }
    if let Some(stripped) = trimmed.strip_suffix("-web") {
        if KNOWN_MODELS.iter().any(|m| m.eq_ignore_ascii_case(stripped)) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}

/// Validate a canonical model name against the served set
pub fn model_from_name(underlying: &str) -> GemWebResult<Model> {
    let name = normalize_model(underlying);
    if KNOWN_MODELS.iter().any(|m| m.eq_ignore_ascii_case(&name)) {
        Ok(Model { name })
    } else {
        Err(GemWebError::model_invalid(name))
    }
}
