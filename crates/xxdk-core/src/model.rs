//! Event model records
//!
//! These are the values the messaging SDK hands to the event model and gets
//! back from it. They travel inside envelope payloads, so every type here is
//! serde-serialisable.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encoding::{base64_bytes, from_base64, to_base64};
use crate::error::{Result, XxdkError};

macro_rules! byte_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(#[serde(with = "base64_bytes")] pub Vec<u8>);

        impl $name {
            /// Raw identifier bytes
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Base64 form, as stored in indexes and shown to JS
            pub fn to_base64(&self) -> String {
                to_base64(&self.0)
            }

            /// Parse the base64 form
            pub fn from_base64(text: &str) -> Result<Self> {
                from_base64(text)
                    .map(Self)
                    .map_err(|e| XxdkError::Decode(format!("invalid {}: {}", stringify!($name), e)))
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }

        impl From<&[u8]> for $name {
            fn from(bytes: &[u8]) -> Self {
                Self(bytes.to_vec())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_base64())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_base64())
            }
        }
    };
}

byte_id!(
    /// Identifier of a channel
    ChannelId
);

byte_id!(
    /// Logical identifier of a message, unique across the store
    MessageId
);

/// A joined channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MessageStatus {
    #[default]
    Unsent,
    Sent,
    Delivered,
    Failed,
}

/// Application-level message type as defined by the SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(pub u16);

impl MessageType {
    pub const TEXT: MessageType = MessageType(1);
    pub const ADMIN_TEXT: MessageType = MessageType(2);
    pub const REACTION: MessageType = MessageType(3);
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::TEXT
    }
}

/// A message as received from the SDK, before it is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<MessageId>,
    #[serde(default)]
    pub nickname: String,
    pub text: String,
    #[serde(default, with = "base64_bytes")]
    pub pub_key: Vec<u8>,
    #[serde(default)]
    pub dm_token: u32,
    #[serde(default)]
    pub codeset_version: u8,
    pub timestamp: DateTime<Utc>,
    /// Lease in milliseconds; zero means the message does not expire
    #[serde(default)]
    pub lease_ms: u64,
    #[serde(default)]
    pub round_id: u64,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub pinned: bool,
}

impl ChannelMessage {
    /// Create a plain text message with default metadata
    pub fn text(
        channel_id: ChannelId,
        message_id: MessageId,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id,
            channel_id,
            parent_message_id: None,
            nickname: String::new(),
            text: text.into(),
            pub_key: Vec::new(),
            dm_token: 0,
            codeset_version: 0,
            timestamp,
            lease_ms: 0,
            round_id: 0,
            message_type: MessageType::TEXT,
            status: MessageStatus::Unsent,
            hidden: false,
            pinned: false,
        }
    }
}

/// A stored message row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    /// Row identifier assigned by the store
    pub uuid: u64,
    #[serde(flatten)]
    pub message: ChannelMessage,
}

/// Partial update of a stored message; only `Some` fields are applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
}

impl MessageUpdate {
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_round_id(mut self, round_id: u64) -> Self {
        self.round_id = Some(round_id);
        self
    }

    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// True when no field would change
    pub fn is_empty(&self) -> bool {
        *self == MessageUpdate::default()
    }

    /// Apply the set fields to a message
    pub fn apply(&self, message: &mut ChannelMessage) {
        if let Some(id) = &self.message_id {
            message.message_id = id.clone();
        }
        if let Some(timestamp) = self.timestamp {
            message.timestamp = timestamp;
        }
        if let Some(round_id) = self.round_id {
            message.round_id = round_id;
        }
        if let Some(pinned) = self.pinned {
            message.pinned = pinned;
        }
        if let Some(hidden) = self.hidden {
            message.hidden = hidden;
        }
        if let Some(status) = self.status {
            message.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> ChannelMessage {
        ChannelMessage::text(
            ChannelId::from(vec![9; 4]),
            MessageId::from(b"m1".to_vec()),
            "hello",
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        )
    }

    #[test]
    fn test_ids_display_as_base64() {
        let id = MessageId::from(b"m1".to_vec());
        assert_eq!(id.to_string(), "bTE=");
        assert_eq!(MessageId::from_base64("bTE=").unwrap(), id);
        assert!(MessageId::from_base64("***").is_err());
    }

    #[test]
    fn test_update_applies_only_set_fields() {
        let mut message = sample();
        let update = MessageUpdate::default()
            .with_status(MessageStatus::Delivered)
            .with_pinned(true);

        update.apply(&mut message);

        assert_eq!(message.status, MessageStatus::Delivered);
        assert!(message.pinned);
        assert!(!message.hidden);
        assert_eq!(message.text, "hello");
        assert_eq!(message.round_id, 0);
    }

    #[test]
    fn test_empty_update() {
        assert!(MessageUpdate::default().is_empty());
        assert!(!MessageUpdate::default().with_hidden(false).is_empty());
    }

    #[test]
    fn test_model_message_flattens() {
        let row = ModelMessage {
            uuid: 3,
            message: sample(),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["uuid"], 3);
        assert_eq!(value["message_id"], "bTE=");

        let back: ModelMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, row);
    }
}
