//! The envelope exchanged across the thread boundary

use serde::{Deserialize, Serialize};
use xxdk_core::encoding::base64_bytes;

use crate::tag::Tag;

/// Correlation id used for singleton traffic: Ready, pushes, and the first
/// call of every tag.
pub const SINGLETON_ID: u64 = 0;

/// What an envelope is, so replies are never mistaken for requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// A call or one-way notification to be handled
    #[default]
    Request,
    /// Successful response; `data` is the result
    Reply,
    /// Failed response; `data` is the UTF-8 error message
    Error,
}

/// Tagged, correlated message unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub tag: Tag,
    pub id: u64,
    #[serde(default)]
    pub kind: Kind,
    #[serde(default, with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn request(tag: Tag, id: u64, data: Vec<u8>) -> Self {
        Self {
            tag,
            id,
            kind: Kind::Request,
            data,
        }
    }

    pub fn reply(tag: Tag, id: u64, data: Vec<u8>) -> Self {
        Self {
            tag,
            id,
            kind: Kind::Reply,
            data,
        }
    }

    pub fn error(tag: Tag, id: u64, message: &str) -> Self {
        Self {
            tag,
            id,
            kind: Kind::Error,
            data: message.as_bytes().to_vec(),
        }
    }

    /// The zero-payload Ready signal
    pub fn ready() -> Self {
        Self::request(Tag::READY, SINGLETON_ID, Vec::new())
    }

    /// True for replies and errors
    pub fn is_response(&self) -> bool {
        !matches!(self.kind, Kind::Request)
    }

    /// Error text of an error envelope
    pub fn error_message(&self) -> Option<String> {
        match self.kind {
            Kind::Error => Some(String::from_utf8_lossy(&self.data).into_owned()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_envelope() {
        let ready = Envelope::ready();
        assert_eq!(ready.tag, Tag::READY);
        assert_eq!(ready.id, SINGLETON_ID);
        assert!(ready.data.is_empty());
        assert!(!ready.is_response());
    }

    #[test]
    fn test_error_message() {
        let env = Envelope::error(Tag::GET_MESSAGE, 4, "not found");
        assert!(env.is_response());
        assert_eq!(env.error_message().as_deref(), Some("not found"));
        assert_eq!(Envelope::reply(Tag::GET_MESSAGE, 4, vec![]).error_message(), None);
    }

    #[test]
    fn test_kind_defaults_to_request() {
        let env: Envelope = serde_json::from_str(r#"{"tag":"Echo","id":0,"data":"cGluZw=="}"#).unwrap();
        assert_eq!(env.kind, Kind::Request);
        assert_eq!(env.data, b"ping");
    }
}
