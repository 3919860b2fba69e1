//! Error types for the transaction anchoring engine
//!
//! This module defines the error types used throughout the engine. The main
//! error type is `AnchorError`. Submission failures are retried and captured
//! as record state rather than surfaced to producers; lookup misses on the
//! verification surface are returned as structured results, so most callers
//! only see a small subset of these variants.

use thiserror::Error;

/// Main error type for the anchoring engine
#[derive(Error, Debug)]
pub enum AnchorError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error (JSON): {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// TOML serialization/deserialization error
    #[error("Configuration error (TOML): {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    /// A single chain submission attempt failed (transient, retryable)
    #[error("Submission error: {0}")]
    Submission(String),

    /// Merkle tree operation failed
    #[error("Merkle tree error: {0}")]
    Merkle(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transaction id is already queued or already mapped to an anchor
    #[error("Transaction {0} is already anchored or queued")]
    AlreadyAnchored(String),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted in the record's current state
    #[error("Operation not allowed: {0}")]
    NotAllowed(String),
}

/// Result type alias for operations that can fail with an [AnchorError]
pub type Result<T> = std::result::Result<T, AnchorError>;

impl AnchorError {
    /// Create a new error with a string message
    pub fn new<S: Into<String>>(msg: S) -> Self {
        AnchorError::InvalidInput(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        AnchorError::InvalidInput(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        AnchorError::NotFound(what.into())
    }

    /// Create a new transient submission error
    pub fn submission<S: Into<String>>(msg: S) -> Self {
        AnchorError::Submission(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        AnchorError::Storage(msg.into())
    }

    /// Create a new not allowed error
    pub fn not_allowed<S: Into<String>>(what: S) -> Self {
        AnchorError::NotAllowed(what.into())
    }
}

// Implement From for common error types
impl From<&str> for AnchorError {
    fn from(s: &str) -> Self {
        AnchorError::new(s)
    }
}

impl From<String> for AnchorError {
    fn from(s: String) -> Self {
        AnchorError::new(s)
    }
}

impl From<tokio::task::JoinError> for AnchorError {
    fn from(err: tokio::task::JoinError) -> Self {
        AnchorError::new(format!("Async task error: {}", err))
    }
}
