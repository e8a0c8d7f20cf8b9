//! Worker channel error types

use std::time::Duration;

use thiserror::Error;
use xxdk_core::XxdkError;
use xxdk_protocol::Tag;

/// Errors raised by the transport, dispatcher and correlator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Outbound envelope could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Nothing registered for the envelope
    #[error("No handler registered for tag {tag} (id {id})")]
    NoHandler { tag: Tag, id: u64 },

    /// The reply did not arrive before the deadline
    #[error("Call {tag} timed out after {}ms", .elapsed.as_millis())]
    Timeout { tag: Tag, elapsed: Duration },

    /// The remote handler answered with an error envelope
    #[error("Remote error for {tag}: {message}")]
    Remote { tag: Tag, message: String },

    /// The peer link is gone
    #[error("Transport closed")]
    TransportClosed,

    /// Ready may only be signalled once per manager
    #[error("Ready signal already sent")]
    AlreadyReady,

    /// The pending slot was dropped without a reply (manager shut down)
    #[error("Call {tag} was abandoned before a reply arrived")]
    Cancelled { tag: Tag },
}

impl From<WorkerError> for XxdkError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Decode(msg) => XxdkError::Decode(msg),
            WorkerError::Encode(msg) => XxdkError::Serialization(msg),
            WorkerError::NoHandler { tag, id } => XxdkError::NoHandler {
                tag: tag.to_string(),
                id,
            },
            WorkerError::Timeout { tag, elapsed } => XxdkError::Timeout {
                tag: tag.to_string(),
                duration_ms: elapsed.as_millis() as u64,
            },
            WorkerError::Remote { message, .. } => XxdkError::from_wire(&message),
            WorkerError::TransportClosed => XxdkError::Channel("transport closed".into()),
            WorkerError::AlreadyReady => XxdkError::Internal("ready already sent".into()),
            WorkerError::Cancelled { tag } => {
                XxdkError::Channel(format!("call {} abandoned", tag))
            }
        }
    }
}

/// Result type for worker channel operations
pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_converts_with_tag_and_duration() {
        let err = WorkerError::Timeout {
            tag: Tag::GET_MESSAGE,
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "Call GetMessage timed out after 1500ms");
        assert_eq!(
            XxdkError::from(err),
            XxdkError::Timeout {
                tag: "GetMessage".into(),
                duration_ms: 1500
            }
        );
    }

    #[test]
    fn test_remote_error_is_rebuilt() {
        let original = XxdkError::NotFound("m1".into());
        let err = WorkerError::Remote {
            tag: Tag::GET_MESSAGE,
            message: original.to_wire(),
        };
        assert_eq!(XxdkError::from(err), original);
    }
}
