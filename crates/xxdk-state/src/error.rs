//! Error types for the storage layer

use thiserror::Error;
use xxdk_core::XxdkError;

/// Errors that can occur in storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A primary key or unique index already holds the value
    #[error("Constraint violated in {store}.{index}")]
    Constraint { store: String, index: String },

    /// No object store with this name
    #[error("Unknown object store: {0}")]
    UnknownStore(String),

    /// No index with this name on the store
    #[error("Unknown index {index} on {store}")]
    UnknownIndex { store: String, index: String },

    /// Requested database version is older than the stored one
    #[error("Cannot open {database} at version {requested}; current version is {current}")]
    Version {
        database: String,
        requested: u32,
        current: u32,
    },

    /// Write attempted in a read transaction
    #[error("Transaction is read-only")]
    ReadOnly,

    /// Record has no usable primary key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backing storage failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StateError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        StateError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, StateError::Constraint { .. })
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

impl From<StateError> for XxdkError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound { .. } => XxdkError::NotFound(err.to_string()),
            StateError::Serialization(msg) => XxdkError::Serialization(msg),
            other => XxdkError::Storage(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_core() {
        let err = StateError::not_found("message", "abc");
        assert_eq!(err.to_string(), "message not found: abc");
        assert!(XxdkError::from(err).is_not_found());
    }

    #[test]
    fn test_constraint_maps_to_storage() {
        let err = StateError::Constraint {
            store: "messages".into(),
            index: "message_id".into(),
        };
        assert!(err.is_constraint());
        assert!(matches!(XxdkError::from(err), XxdkError::Storage(_)));
    }
}
