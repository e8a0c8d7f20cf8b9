//! xxdk Protocol - Envelope framing and message definitions
//!
//! This crate defines what crosses the main-thread / Worker boundary: the
//! tagged, correlated [`Envelope`], the [`Frame`] it is encoded into, the
//! well-known [`Tag`]s, and the typed payloads each tag carries.

pub mod codec;
pub mod envelope;
pub mod messages;
pub mod tag;

pub use codec::{decode, decode_payload, encode, encode_payload, Frame};
pub use envelope::{Envelope, Kind, SINGLETON_ID};
pub use tag::Tag;
