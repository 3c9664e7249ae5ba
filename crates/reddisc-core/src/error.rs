//! Error types for RedDisc Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    // Tenant errors
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration not found")]
    ConfigNotFound,

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    // Comment source errors
    #[error("Comment source error: {0}")]
    Source(String),

    #[error("Context unavailable: {0}")]
    ContextUnavailable(String),

    // Notifier sink errors
    #[error("Notifier sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
