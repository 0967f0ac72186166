//! Muninn error types

use std::time::Duration;

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    // Registry errors
    #[error("provider already registered: {0}")]
    DuplicateProvider(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    // Provider errors (caught at the dispatch boundary)
    #[error("provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("provider '{provider}' timed out after {after:?}")]
    Timeout { provider: String, after: Duration },

    #[error("provider '{provider}' panicked")]
    Panicked { provider: String },

    /// A settings value does not satisfy the provider's declared schema.
    #[error("invalid setting '{key}' for provider '{provider}': {reason}")]
    InvalidSetting {
        provider: String,
        key: String,
        reason: String,
    },

    // Persistence errors
    #[error("store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MuninnError {
    /// Build a [`MuninnError::Provider`] from any displayable failure.
    pub fn provider(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;
