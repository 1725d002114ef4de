//! Error types for AI providers.

use thiserror::Error;

/// Errors that can occur when talking to an AI provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider is missing its API key or other configuration.
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Provider rejected the request with 429.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Response body could not be interpreted.
    #[error("Failed to parse AI response: {reason}")]
    ResponseParse { reason: String },
}

impl LlmError {
    /// Whether the error is a configuration problem that retrying cannot fix.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }
}

/// Result alias for provider operations.
pub type LlmResult<T> = Result<T, LlmError>;
