use thiserror::Error;

/// Main error type for the pursuit engine
#[derive(Error, Debug)]
pub enum QuarryError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Sighting feed errors
    #[error("Source error: {source_name}: {reason}")]
    Source { source_name: String, reason: String },

    #[error("Invalid target id: {0}")]
    InvalidTargetId(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for QuarryError
pub type Result<T> = std::result::Result<T, QuarryError>;
