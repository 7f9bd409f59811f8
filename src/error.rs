use std::path::PathBuf;
use thiserror::Error;

use crate::retrieval::MethodFailure;

/// Main error type for rankfuse
#[derive(Error, Debug)]
pub enum RankFuseError {
    /// Caller supplied an unusable query (empty text, zero limit)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Every retrieval method failed; no partial results are returned
    #[error("Retrieval unavailable: all methods failed ({})", summarize_failures(.failures))]
    RetrievalUnavailable { failures: Vec<MethodFailure> },

    /// The caller cancelled the search before it completed
    #[error("Search cancelled")]
    Cancelled,

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn summarize_failures(failures: &[MethodFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for rankfuse operations
pub type Result<T> = std::result::Result<T, RankFuseError>;
