//! Typed payloads carried in envelope `data`
//!
//! Each tag has one request payload and, where it answers, one reply
//! payload. Tags that carry a bare model record (`JoinChannel` carries a
//! [`xxdk_core::model::Channel`], `ReceiveMessage` a
//! [`ChannelMessage`]) have no wrapper here.

use serde::{Deserialize, Serialize};
use xxdk_core::encoding::base64_option;
use xxdk_core::model::{ChannelId, ChannelMessage, MessageId, MessageUpdate};

/// `NewWASMEventModel`: open the Worker's store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEventModelMessage {
    pub database_name: String,
    /// Marshalled cipher state; `None` opens the store unencrypted
    #[serde(default, with = "base64_option")]
    pub encryption: Option<Vec<u8>>,
}

/// `EncryptionStatus`: Worker asks the main thread to record a status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionStatusMessage {
    pub database_name: String,
    pub encryption_status: bool,
}

/// Reply to `EncryptionStatus`: the authoritative stored status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionStatusReply {
    pub encryption_status: bool,
}

/// `StoreDatabaseName`: Worker asks the main thread to remember a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDatabaseNameMessage {
    pub database_name: String,
}

/// `LeaveChannel`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIdMessage {
    pub channel_id: ChannelId,
}

/// `ReceiveReply` and `ReceiveReaction`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveChildMessage {
    pub message: ChannelMessage,
    pub parent: MessageId,
}

/// Reply carrying a row identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UuidReply {
    pub uuid: u64,
}

/// `UpdateFromUUID`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFromUuidMessage {
    pub uuid: u64,
    pub update: MessageUpdate,
}

/// `UpdateFromMessageID`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFromMessageIdMessage {
    pub message_id: MessageId,
    pub update: MessageUpdate,
}

/// `GetMessage` and `DeleteMessage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageIdMessage {
    pub message_id: MessageId,
}

/// `MessageReceivedCallback`: pushed by the Worker after each insert or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceivedMessage {
    pub uuid: u64,
    pub channel_id: ChannelId,
    pub update: bool,
}

/// `NewLogFile`: create the Worker's circular log buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogFileMessage {
    pub name: String,
    pub max_size: usize,
}

/// Reply to `Size`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeReply {
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_payload, encode_payload};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_new_event_model_without_cipher() {
        let msg: NewEventModelMessage =
            decode_payload(br#"{"database_name":"test"}"#).unwrap();
        assert_eq!(msg.database_name, "test");
        assert!(msg.encryption.is_none());
    }

    #[test]
    fn test_child_message_round_trip() {
        let message = ChannelMessage::text(
            ChannelId::from(vec![1; 8]),
            MessageId::from(b"child".to_vec()),
            "+1",
            Utc.timestamp_millis_opt(1_000).unwrap(),
        );
        let payload = ReceiveChildMessage {
            message,
            parent: MessageId::from(b"parent".to_vec()),
        };
        let bytes = encode_payload(&payload).unwrap();
        assert_eq!(decode_payload::<ReceiveChildMessage>(&bytes).unwrap(), payload);
    }
}
