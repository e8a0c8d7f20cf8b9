//! Envelope and payload encoding
//!
//! Envelopes are carried as [`Frame`]s. Text frames hold JSON and are what
//! the browser posts as plain strings; binary frames hold CBOR and are posted
//! with their buffer in the transfer list so large payloads are moved rather
//! than copied. Both decode to the same [`Envelope`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use xxdk_core::{Result, WireFormat, XxdkError};

use crate::envelope::Envelope;

/// An encoded envelope as it crosses the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON text
    Text(String),
    /// CBOR bytes
    Binary(Vec<u8>),
}

impl Frame {
    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode an envelope in the requested wire format
pub fn encode(envelope: &Envelope, format: WireFormat) -> Result<Frame> {
    match format {
        WireFormat::Json => serde_json::to_string(envelope)
            .map(Frame::Text)
            .map_err(|e| XxdkError::Serialization(e.to_string())),
        WireFormat::Cbor => serde_cbor::to_vec(envelope)
            .map(Frame::Binary)
            .map_err(|e| XxdkError::Serialization(e.to_string())),
    }
}

/// Decode a frame of either kind
pub fn decode(frame: &Frame) -> Result<Envelope> {
    match frame {
        Frame::Text(text) => serde_json::from_str(text)
            .map_err(|e| XxdkError::Decode(format!("invalid JSON envelope: {}", e))),
        Frame::Binary(bytes) => serde_cbor::from_slice(bytes)
            .map_err(|e| XxdkError::Decode(format!("invalid CBOR envelope: {}", e))),
    }
}

/// Encode an application payload (always JSON)
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| XxdkError::Serialization(e.to_string()))
}

/// Decode an application payload
pub fn decode_payload<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| XxdkError::Decode(format!("invalid payload: {}", e)))
}
