//! Worker-side event model adapter
//!
//! [`ChannelsWorker`] answers the main thread's model calls with a real
//! [`ChannelStore`]. The store does not exist until the main thread sends
//! `NewWASMEventModel`; model calls arriving before that fail with an
//! initialisation error.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info};
use xxdk_core::{
    Channel, ChannelId, ChannelMessage, Cipher, CipherFactory, EventModel, MessageReceivedCallback,
    Result, XxdkError,
};
use xxdk_protocol::messages::{
    ChannelIdMessage, MessageIdMessage, MessageReceivedMessage, NewEventModelMessage,
    ReceiveChildMessage, UpdateFromMessageIdMessage, UpdateFromUuidMessage, UuidReply,
};
use xxdk_protocol::{decode_payload, encode_payload, Tag};
use xxdk_worker::{Reply, WorkerManager};

use crate::channels::ChannelStore;
use crate::object_store::DatabaseFactory;
use crate::registry::RemoteRegistry;
use crate::wire;

type ModelSlot = Arc<RwLock<Option<Arc<ChannelStore>>>>;

fn current_model(slot: &ModelSlot) -> Result<Arc<ChannelStore>> {
    slot.read()
        .clone()
        .ok_or_else(|| XxdkError::Initialization("event model not initialised".into()))
}

/// Pushes message notifications back to the main thread
struct NotifyMainThread {
    manager: WorkerManager,
}

impl MessageReceivedCallback for NotifyMainThread {
    fn message_received(&self, uuid: u64, channel_id: &ChannelId, update: bool) {
        let push = MessageReceivedMessage {
            uuid,
            channel_id: channel_id.clone(),
            update,
        };
        let sent = encode_payload(&push)
            .and_then(|data| Ok(self.manager.notify(Tag::MESSAGE_RECEIVED, data)?));
        if let Err(e) = sent {
            error!(uuid, error = %e, "Failed to push message notification");
        }
    }
}

/// The channels event model handler set
pub struct ChannelsWorker {
    manager: WorkerManager,
    factory: Arc<DatabaseFactory>,
    cipher_factory: Option<Arc<dyn CipherFactory>>,
    model: ModelSlot,
}

impl ChannelsWorker {
    pub fn new(manager: WorkerManager, factory: Arc<DatabaseFactory>) -> Self {
        Self {
            manager,
            factory,
            cipher_factory: None,
            model: Arc::new(RwLock::new(None)),
        }
    }

    /// Rebuild ciphers sent by the main thread with `cipher_factory`.
    ///
    /// Without one, opening an encrypted database fails.
    pub fn with_cipher_factory(mut self, cipher_factory: Arc<dyn CipherFactory>) -> Self {
        self.cipher_factory = Some(cipher_factory);
        self
    }

    pub fn manager(&self) -> &WorkerManager {
        &self.manager
    }

    /// Register every handler, then tell the main thread the Worker is ready
    pub fn start(&self) -> Result<()> {
        self.register_new_event_model();

        self.serve(Tag::JOIN_CHANNEL, |model, channel: Channel| async move {
            model.join_channel(channel).await
        });
        self.serve(Tag::LEAVE_CHANNEL, |model, msg: ChannelIdMessage| async move {
            model.leave_channel(&msg.channel_id).await
        });
        self.serve(Tag::RECEIVE_MESSAGE, |model, message: ChannelMessage| async move {
            let uuid = model.receive_message(message).await?;
            Ok(UuidReply { uuid })
        });
        self.serve(Tag::RECEIVE_REPLY, |model, msg: ReceiveChildMessage| async move {
            let uuid = model.receive_reply(msg.message, msg.parent).await?;
            Ok(UuidReply { uuid })
        });
        self.serve(Tag::RECEIVE_REACTION, |model, msg: ReceiveChildMessage| async move {
            let uuid = model.receive_reaction(msg.message, msg.parent).await?;
            Ok(UuidReply { uuid })
        });
        self.serve(Tag::UPDATE_FROM_UUID, |model, msg: UpdateFromUuidMessage| async move {
            model.update_from_uuid(msg.uuid, msg.update).await
        });
        self.serve(
            Tag::UPDATE_FROM_MESSAGE_ID,
            |model, msg: UpdateFromMessageIdMessage| async move {
                let uuid = model
                    .update_from_message_id(&msg.message_id, msg.update)
                    .await?;
                Ok(UuidReply { uuid })
            },
        );
        self.serve(Tag::GET_MESSAGE, |model, msg: MessageIdMessage| async move {
            model.get_message(&msg.message_id).await
        });
        self.serve(Tag::DELETE_MESSAGE, |model, msg: MessageIdMessage| async move {
            model.delete_message(&msg.message_id).await
        });

        info!(endpoint = self.manager.name(), "Channels worker handlers registered");
        self.manager.signal_ready()?;
        Ok(())
    }

    fn register_new_event_model(&self) {
        let manager = self.manager.clone();
        let factory = self.factory.clone();
        let cipher_factory = self.cipher_factory.clone();
        let slot = self.model.clone();

        self.manager.register_handler(Tag::NEW_EVENT_MODEL, move |data| {
            let manager = manager.clone();
            let factory = factory.clone();
            let cipher_factory = cipher_factory.clone();
            let slot = slot.clone();
            async move {
                let opened = async {
                    let msg: NewEventModelMessage = decode_payload(&data)?;
                    let cipher = restore_cipher(msg.encryption.as_deref(), cipher_factory.as_deref())?;
                    let registry = RemoteRegistry::new(manager.clone());
                    let callback = Arc::new(NotifyMainThread { manager });
                    let store =
                        ChannelStore::open(&factory, &msg.database_name, cipher, &registry, callback)
                            .await?;
                    *slot.write() = Some(Arc::new(store));
                    Ok::<(), XxdkError>(())
                }
                .await;

                if let Err(e) = &opened {
                    error!(error = %e, "Failed to open channel store");
                }
                wire::reply(opened)
            }
        });
    }

    /// Register a handler that decodes `Req`, runs `f` against the open
    /// store and replies with its encoded result
    fn serve<Req, Resp, F, Fut>(&self, tag: Tag, f: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + 'static,
        F: Fn(Arc<ChannelStore>, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        let slot = self.model.clone();
        self.manager.register_handler(tag, move |data| {
            let pending = current_model(&slot)
                .and_then(|model| decode_payload::<Req>(&data).map(|request| f(model, request)));
            async move {
                match pending {
                    Ok(call) => wire::reply(call.await),
                    Err(e) => Reply::Err(e.to_wire()),
                }
            }
        });
    }
}

fn restore_cipher(
    state: Option<&[u8]>,
    factory: Option<&dyn CipherFactory>,
) -> Result<Option<Arc<dyn Cipher>>> {
    match (state, factory) {
        (None, _) => Ok(None),
        (Some(state), Some(factory)) => factory.restore(state).map(Some),
        (Some(_), None) => Err(XxdkError::Initialization(
            "encrypted database requested but no cipher factory is configured".into(),
        )),
    }
}
