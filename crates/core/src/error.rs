//! Error types for the Folio domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; `ChatError` is the one the
//! HTTP layer ultimately sees.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for a chat request.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Nothing to send (no text, no image) or a malformed request body.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An upload exceeded the configured byte limit.
    #[error("Upload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A fatal upstream failure aborted the fallback loop.
    #[error("Upstream failure: {0}")]
    Upstream(ProviderError),

    /// Every candidate model failed retryably.
    #[error("All {attempts} candidate models failed; last error: {last}")]
    Exhausted {
        attempts: usize,
        last: ProviderError,
    },
}

/// Result type alias using our ChatError.
pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// Whether the failure was caused by the caller rather than the upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::PayloadTooLarge { .. })
    }
}

// --- Bounded context errors ---

/// How the fallback loop should react to a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Another candidate model may succeed; move on.
    Retryable,
    /// No model substitution can fix this; stop immediately.
    Fatal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retryable => write!(f, "retryable"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// A typed upstream failure, classified at the client boundary.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model temporarily unavailable: {message} (status: {status_code})")]
    Unavailable { status_code: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Request rejected by provider: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Content blocked: {0}")]
    ContentBlocked(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Retryable vs. fatal classification used by the fallback loop.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. }
            | Self::QuotaExceeded(_)
            | Self::ModelNotFound(_)
            | Self::Unavailable { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::EmptyResponse(_) => FailureKind::Retryable,
            Self::InvalidRequest(_)
            | Self::AuthenticationFailed(_)
            | Self::ContentBlocked(_)
            | Self::ApiError { .. }
            | Self::NotConfigured(_) => FailureKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Retryable
    }
}

/// Failures while normalizing an uploaded image.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Image too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Temporary storage error: {0}")]
    Io(String),
}
