//! Constructor methods for GemWebError

use super::types::GemWebError;

impl GemWebError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error naming the offending field
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a model invalid error
    pub fn model_invalid(model: impl Into<String>) -> Self {
        Self::ModelInvalid {
            model: model.into(),
        }
    }

    /// Create a usage limit error
    pub fn usage_limit(message: impl Into<String>) -> Self {
        Self::UsageLimitExceeded {
            message: message.into(),
        }
    }

    /// Create a temporarily blocked error
    pub fn blocked(message: impl Into<String>) -> Self {
        Self::TemporarilyBlocked {
            message: message.into(),
        }
    }

    /// Create a value error
    pub fn value(message: impl Into<String>) -> Self {
        Self::Value {
            message: message.into(),
        }
    }

    /// Create an upstream timeout error
    pub fn upstream_timeout(seconds: u64) -> Self {
        Self::UpstreamTimeout { seconds }
    }

    /// Create a generic upstream error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            path: None,
        }
    }

    /// Create a storage error with the file path
    pub fn storage_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create an IO error with the file path
    pub fn io_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: Some(path.into()),
        }
    }
}
