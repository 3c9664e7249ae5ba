//! Egress error types

use reddisc_core::Error as CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EgressError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Upstream returned {status_code}: {body}")]
    Provider { status_code: u16, body: String },

    #[error("Rate limit exceeded (retry after {retry_after_secs:?}s)")]
    RateLimitExceeded { retry_after_secs: Option<u64> },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for EgressError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Http(e)
        }
    }
}

impl EgressError {
    /// Whether a retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_request(),
            Self::Provider { status_code, .. } => matches!(status_code, 500 | 502 | 503 | 504),
            Self::RateLimitExceeded { .. } | Self::Timeout(_) => true,
            Self::Parse(_) | Self::Config(_) => false,
        }
    }

    /// Convert at the `CommentSource` boundary
    pub fn into_source_error(self) -> CoreError {
        CoreError::Source(self.to_string())
    }

    /// Convert at the context-lookup boundary; lookups degrade rather than fail
    pub fn into_context_error(self) -> CoreError {
        CoreError::ContextUnavailable(self.to_string())
    }

    /// Convert at the `NotifierSink` boundary
    pub fn into_sink_error(self) -> CoreError {
        CoreError::Sink(self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EgressError>;
