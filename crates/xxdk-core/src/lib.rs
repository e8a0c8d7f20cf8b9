//! xxdk Core - Foundational types and traits for the worker bindings
//!
//! This crate provides the abstractions shared by both sides of the
//! main-thread / Worker boundary: the event model capability the messaging
//! SDK persists through, the records it stores, the cipher interface used to
//! encrypt stored text, and the workspace-wide error and configuration types.
//!
//! # Modules
//!
//! - [`model`] - Channel and message records plus partial updates
//! - [`config`] - Worker, storage and logging configuration
//! - [`error`] - Error types shared across the thread boundary
//! - [`encoding`] - Serde helpers for byte fields
//! - [`logging`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```rust
//! use xxdk_core::model::{MessageId, MessageUpdate, MessageStatus};
//!
//! let id = MessageId::from(b"m1".to_vec());
//! let update = MessageUpdate::default().with_status(MessageStatus::Delivered);
//! assert!(update.message_id.is_none());
//! println!("updating {}", id);
//! ```

pub mod config;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod model;

use std::sync::Arc;

use async_trait::async_trait;

// Re-exports for convenience
pub use config::{Config, LoggingConfig, StorageConfig, WireFormat, WorkerConfig};
pub use error::{Result, XxdkError};
pub use model::{
    Channel, ChannelId, ChannelMessage, MessageId, MessageStatus, MessageType, MessageUpdate,
    ModelMessage,
};

/// Persistence capability the messaging SDK drives.
///
/// Implemented locally by the storage-backed channel store inside the Worker
/// and, on the main thread, by the remote proxy that forwards every call
/// across the thread boundary.
#[async_trait]
pub trait EventModel: Send + Sync {
    /// Record that the user joined a channel
    async fn join_channel(&self, channel: Channel) -> Result<()>;

    /// Remove a channel and every message stored for it
    async fn leave_channel(&self, channel_id: &ChannelId) -> Result<()>;

    /// Store a new message and return its row identifier
    async fn receive_message(&self, message: ChannelMessage) -> Result<u64>;

    /// Store a reply to `reply_to` and return its row identifier
    async fn receive_reply(&self, message: ChannelMessage, reply_to: MessageId) -> Result<u64>;

    /// Store a reaction to `react_to` and return its row identifier
    async fn receive_reaction(&self, message: ChannelMessage, react_to: MessageId) -> Result<u64>;

    /// Apply a partial update to the row with the given identifier
    async fn update_from_uuid(&self, uuid: u64, update: MessageUpdate) -> Result<()>;

    /// Apply a partial update to the row holding `message_id`, returning its row identifier
    async fn update_from_message_id(
        &self,
        message_id: &MessageId,
        update: MessageUpdate,
    ) -> Result<u64>;

    /// Fetch a stored message by its logical identifier
    async fn get_message(&self, message_id: &MessageId) -> Result<ModelMessage>;

    /// Delete a stored message by its logical identifier
    async fn delete_message(&self, message_id: &MessageId) -> Result<()>;
}

/// Notification fired whenever a message row is inserted or updated.
pub trait MessageReceivedCallback: Send + Sync {
    fn message_received(&self, uuid: u64, channel_id: &ChannelId, update: bool);
}

impl<F> MessageReceivedCallback for F
where
    F: Fn(u64, &ChannelId, bool) + Send + Sync,
{
    fn message_received(&self, uuid: u64, channel_id: &ChannelId, update: bool) {
        self(uuid, channel_id, update)
    }
}

/// Symmetric cipher used to protect message text at rest.
pub trait Cipher: Send + Sync {
    /// Encrypt plaintext
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt ciphertext produced by [`Cipher::encrypt`]
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Serialise the cipher so another thread can rebuild it
    fn marshal(&self) -> Result<Vec<u8>>;
}

/// Rebuilds a [`Cipher`] from its marshalled state on the far side of the boundary.
pub trait CipherFactory: Send + Sync {
    fn restore(&self, state: &[u8]) -> Result<Arc<dyn Cipher>>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
