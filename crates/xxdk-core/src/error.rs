//! Error types shared by both sides of the worker boundary
//!
//! [`XxdkError`] is serialisable so that a failure raised by a handler in the
//! Worker can be carried back in an error envelope and rebuilt on the main
//! thread with its variant intact.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the worker bindings
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum XxdkError {
    // ===== Wire Errors =====
    /// Malformed envelope or payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// No handler registered for the envelope's tag/id
    #[error("No handler registered for tag {tag} (id {id})")]
    NoHandler { tag: String, id: u64 },

    /// A call did not receive its response in time
    #[error("Call {tag} timed out after {duration_ms}ms")]
    Timeout { tag: String, duration_ms: u64 },

    /// The peer thread went away
    #[error("Channel error: {0}")]
    Channel(String),

    /// Failure reported by the remote side that could not be decoded further
    #[error("Remote error: {0}")]
    Remote(String),

    // ===== Model Errors =====
    /// Worker-side setup failed; the model must not be used
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Database was created with a different encryption status
    #[error(
        "Database {database} was created with encryption {stored} but was opened with encryption {requested}"
    )]
    EncryptionMismatch {
        database: String,
        stored: bool,
        requested: bool,
    },

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Encryption or decryption failed
    #[error("Cipher error: {0}")]
    Cipher(String),

    // ===== General Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl XxdkError {
    /// Check if this error is retriable
    pub fn is_retriable(&self) -> bool {
        matches!(self, XxdkError::Timeout { .. } | XxdkError::Channel(_))
    }

    /// Check if this error means the record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, XxdkError::NotFound(_))
    }

    /// Get an error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            XxdkError::Decode(_) => "DECODE_ERROR",
            XxdkError::NoHandler { .. } => "NO_HANDLER",
            XxdkError::Timeout { .. } => "TIMEOUT",
            XxdkError::Channel(_) => "CHANNEL_ERROR",
            XxdkError::Remote(_) => "REMOTE_ERROR",
            XxdkError::Initialization(_) => "INITIALIZATION_FAILED",
            XxdkError::EncryptionMismatch { .. } => "ENCRYPTION_MISMATCH",
            XxdkError::NotFound(_) => "NOT_FOUND",
            XxdkError::Storage(_) => "STORAGE_ERROR",
            XxdkError::Serialization(_) => "SERIALIZATION_ERROR",
            XxdkError::Cipher(_) => "CIPHER_ERROR",
            XxdkError::InvalidConfig(_) => "INVALID_CONFIG",
            XxdkError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Serialise this error for an error envelope
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.to_string())
    }

    /// Rebuild an error from an error envelope's message.
    ///
    /// Messages that are not a serialised `XxdkError` become [`XxdkError::Remote`].
    pub fn from_wire(message: &str) -> Self {
        serde_json::from_str(message).unwrap_or_else(|_| XxdkError::Remote(message.to_string()))
    }
}

/// Result type alias for xxdk operations
pub type Result<T> = std::result::Result<T, XxdkError>;

impl From<serde_json::Error> for XxdkError {
    fn from(err: serde_json::Error) -> Self {
        XxdkError::Serialization(err.to_string())
    }
}
