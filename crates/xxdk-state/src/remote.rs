//! Main-thread event model proxy
//!
//! [`RemoteEventModel`] implements [`EventModel`] by forwarding every call
//! to the [`ChannelsWorker`](crate::worker::ChannelsWorker) over a worker
//! channel. It also serves the Worker's requests that need the main thread:
//! message notifications and the database registry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use xxdk_core::{
    Channel, ChannelId, ChannelMessage, Cipher, EventModel, MessageId, MessageReceivedCallback,
    MessageUpdate, ModelMessage, Result, XxdkError,
};
use xxdk_protocol::messages::{
    ChannelIdMessage, MessageIdMessage, MessageReceivedMessage, NewEventModelMessage,
    ReceiveChildMessage, UpdateFromMessageIdMessage, UpdateFromUuidMessage, UuidReply,
};
use xxdk_protocol::{decode_payload, Tag};
use xxdk_worker::{Reply, WorkerManager};

use crate::registry::LocalRegistry;
use crate::wire;

/// Event model living in a Worker, driven from the main thread
pub struct RemoteEventModel {
    manager: WorkerManager,
    database_name: String,
}

impl RemoteEventModel {
    /// Connect to a started channels Worker and open `database_name` in it.
    ///
    /// Waits up to the configured start-up timeout for the Worker's Ready
    /// signal. An encryption status that disagrees with the stored one
    /// surfaces as [`XxdkError::EncryptionMismatch`]; every other failure as
    /// [`XxdkError::Initialization`].
    pub async fn new(
        manager: WorkerManager,
        registry: LocalRegistry,
        database_name: &str,
        cipher: Option<Arc<dyn Cipher>>,
        callback: Arc<dyn MessageReceivedCallback>,
    ) -> Result<Self> {
        manager.register_handler(Tag::MESSAGE_RECEIVED, move |data| {
            let callback = callback.clone();
            async move {
                match decode_payload::<MessageReceivedMessage>(&data) {
                    Ok(msg) => callback.message_received(msg.uuid, &msg.channel_id, msg.update),
                    Err(e) => warn!(error = %e, "Dropping malformed message notification"),
                }
                Reply::None
            }
        });
        registry.serve(&manager);

        manager
            .wait_ready()
            .await
            .map_err(|e| XxdkError::Initialization(format!("worker never became ready: {}", e)))?;

        let encryption = cipher.map(|cipher| cipher.marshal()).transpose()?;
        let request = NewEventModelMessage {
            database_name: database_name.to_string(),
            encryption,
        };
        match wire::call_empty(&manager, Tag::NEW_EVENT_MODEL, &request).await {
            Ok(()) => {}
            Err(e @ XxdkError::EncryptionMismatch { .. }) => return Err(e),
            Err(e @ XxdkError::Initialization(_)) => return Err(e),
            Err(e) => return Err(XxdkError::Initialization(e.to_string())),
        }

        info!(database = database_name, endpoint = manager.name(), "Remote event model ready");
        Ok(Self {
            manager,
            database_name: database_name.to_string(),
        })
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn manager(&self) -> &WorkerManager {
        &self.manager
    }
}

#[async_trait]
impl EventModel for RemoteEventModel {
    async fn join_channel(&self, channel: Channel) -> Result<()> {
        wire::call_empty(&self.manager, Tag::JOIN_CHANNEL, &channel).await
    }

    async fn leave_channel(&self, channel_id: &ChannelId) -> Result<()> {
        let request = ChannelIdMessage {
            channel_id: channel_id.clone(),
        };
        wire::call_empty(&self.manager, Tag::LEAVE_CHANNEL, &request).await
    }

    async fn receive_message(&self, message: ChannelMessage) -> Result<u64> {
        let reply: UuidReply = wire::call(&self.manager, Tag::RECEIVE_MESSAGE, &message).await?;
        Ok(reply.uuid)
    }

    async fn receive_reply(&self, message: ChannelMessage, reply_to: MessageId) -> Result<u64> {
        let request = ReceiveChildMessage {
            message,
            parent: reply_to,
        };
        let reply: UuidReply = wire::call(&self.manager, Tag::RECEIVE_REPLY, &request).await?;
        Ok(reply.uuid)
    }

    async fn receive_reaction(&self, message: ChannelMessage, react_to: MessageId) -> Result<u64> {
        let request = ReceiveChildMessage {
            message,
            parent: react_to,
        };
        let reply: UuidReply = wire::call(&self.manager, Tag::RECEIVE_REACTION, &request).await?;
        Ok(reply.uuid)
    }

    async fn update_from_uuid(&self, uuid: u64, update: MessageUpdate) -> Result<()> {
        let request = UpdateFromUuidMessage { uuid, update };
        wire::call_empty(&self.manager, Tag::UPDATE_FROM_UUID, &request).await
    }

    async fn update_from_message_id(
        &self,
        message_id: &MessageId,
        update: MessageUpdate,
    ) -> Result<u64> {
        let request = UpdateFromMessageIdMessage {
            message_id: message_id.clone(),
            update,
        };
        let reply: UuidReply =
            wire::call(&self.manager, Tag::UPDATE_FROM_MESSAGE_ID, &request).await?;
        Ok(reply.uuid)
    }

    async fn get_message(&self, message_id: &MessageId) -> Result<ModelMessage> {
        let request = MessageIdMessage {
            message_id: message_id.clone(),
        };
        wire::call(&self.manager, Tag::GET_MESSAGE, &request).await
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<()> {
        let request = MessageIdMessage {
            message_id: message_id.clone(),
        };
        wire::call_empty(&self.manager, Tag::DELETE_MESSAGE, &request).await
    }
}
