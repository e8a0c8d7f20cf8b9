//! Envelope tags
//!
//! A tag names the remote operation or notification class an envelope
//! belongs to and is the dispatch key on the receiving side.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Operation or notification class of an envelope
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Cow<'static, str>);

impl Tag {
    /// A tag known at compile time
    pub const fn from_static(name: &'static str) -> Self {
        Tag(Cow::Borrowed(name))
    }

    /// A tag built at runtime
    pub fn new(name: impl Into<String>) -> Self {
        Tag(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // ===== Lifecycle =====
    /// Sent once by a Worker after all of its handlers are registered
    pub const READY: Tag = Tag::from_static("Ready");

    // ===== Channels event model =====
    pub const NEW_EVENT_MODEL: Tag = Tag::from_static("NewWASMEventModel");
    pub const ENCRYPTION_STATUS: Tag = Tag::from_static("EncryptionStatus");
    pub const STORE_DATABASE_NAME: Tag = Tag::from_static("StoreDatabaseName");
    pub const MESSAGE_RECEIVED: Tag = Tag::from_static("MessageReceivedCallback");
    pub const JOIN_CHANNEL: Tag = Tag::from_static("JoinChannel");
    pub const LEAVE_CHANNEL: Tag = Tag::from_static("LeaveChannel");
    pub const RECEIVE_MESSAGE: Tag = Tag::from_static("ReceiveMessage");
    pub const RECEIVE_REPLY: Tag = Tag::from_static("ReceiveReply");
    pub const RECEIVE_REACTION: Tag = Tag::from_static("ReceiveReaction");
    pub const UPDATE_FROM_UUID: Tag = Tag::from_static("UpdateFromUUID");
    pub const UPDATE_FROM_MESSAGE_ID: Tag = Tag::from_static("UpdateFromMessageID");
    pub const GET_MESSAGE: Tag = Tag::from_static("GetMessage");
    pub const DELETE_MESSAGE: Tag = Tag::from_static("DeleteMessage");

    // ===== Log file worker =====
    pub const NEW_LOG_FILE: Tag = Tag::from_static("NewLogFile");
    pub const WRITE_LOG: Tag = Tag::from_static("WriteLog");
    pub const GET_FILE: Tag = Tag::from_static("GetFile");
    pub const SIZE: Tag = Tag::from_static("Size");
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}

impl From<&'static str> for Tag {
    fn from(name: &'static str) -> Self {
        Tag::from_static(name)
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_static_and_owned_tags_are_equal() {
        assert_eq!(Tag::READY, Tag::new("Ready"));

        let mut map = HashMap::new();
        map.insert(Tag::new("GetMessage"), 1);
        assert_eq!(map.get(&Tag::GET_MESSAGE), Some(&1));
    }

    #[test]
    fn test_tag_serializes_as_string() {
        assert_eq!(serde_json::to_string(&Tag::SIZE).unwrap(), r#""Size""#);
        let tag: Tag = serde_json::from_str(r#""Echo""#).unwrap();
        assert_eq!(tag.as_str(), "Echo");
    }
}
