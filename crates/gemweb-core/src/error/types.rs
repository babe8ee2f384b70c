//! Core error enum and result alias

use thiserror::Error;

/// Result type alias for bridge core operations
pub type GemWebResult<T> = Result<T, GemWebError>;

/// Main error type for the bridge core
///
/// Variants carry enough structure for callers to branch on the failure
/// class; [`GemWebError::status_code`] collapses them onto the adapter's
/// HTTP status taxonomy.
#[derive(Error, Debug, Clone)]
pub enum GemWebError {
    /// Configuration related errors
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Malformed or rejected client input
    #[error("bad request: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// The requested model is not served by the upstream
    #[error("model invalid: {model}")]
    ModelInvalid { model: String },

    /// Upstream usage limit reached for this account
    #[error("usage limit exceeded: {message}")]
    UsageLimitExceeded { message: String },

    /// Upstream temporarily blocked the account
    #[error("temporarily blocked: {message}")]
    TemporarilyBlocked { message: String },

    /// Upstream rejected a request value
    #[error("value error: {message}")]
    Value { message: String },

    /// Upstream call timed out
    #[error("upstream timeout after {seconds} seconds")]
    UpstreamTimeout { seconds: u64 },

    /// Any other upstream failure
    #[error("upstream error: {message}")]
    Upstream { message: String },

    /// Persistence failures (logged and swallowed by the account layer)
    #[error("storage error: {message}")]
    Storage {
        message: String,
        path: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("json error: {message}")]
    Json { message: String },

    /// Local IO errors
    #[error("io error: {message}")]
    Io {
        message: String,
        path: Option<String>,
    },

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,
}

impl GemWebError {
    /// HTTP status code the adapter surface should report for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } | Self::ModelInvalid { .. } | Self::Value { .. } => 400,
            Self::UsageLimitExceeded { .. } | Self::TemporarilyBlocked { .. } => 429,
            Self::UpstreamTimeout { .. } => 504,
            _ => 500,
        }
    }

    /// Whether a retry against the same account could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout { .. } | Self::TemporarilyBlocked { .. }
        )
    }
}

impl From<serde_json::Error> for GemWebError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for GemWebError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<rusqlite::Error> for GemWebError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
            path: None,
        }
    }
}
