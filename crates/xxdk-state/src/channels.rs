//! Channel store
//!
//! The storage-backed [`EventModel`] that runs inside the Worker. Messages
//! live in the `messages` object store under an auto-increment row id (the
//! uuid handed back to the SDK) with a unique index on the logical message
//! id; channels live in the `channels` store keyed by channel id. When a
//! cipher is configured, message text is encrypted before it is written and
//! decrypted on the way out.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use xxdk_core::encoding::{from_base64, to_base64};
use xxdk_core::{
    Channel, ChannelId, ChannelMessage, Cipher, EventModel, MessageId, MessageReceivedCallback,
    MessageUpdate, ModelMessage, Result, XxdkError,
};

use crate::error::StateError;
use crate::object_store::{Database, DatabaseFactory, Direction, Key, KeyRange, StoreOptions, Upgrade};
use crate::registry::{check_encryption_status, DatabaseRegistry};

/// Schema version of the channel database
pub const DATABASE_VERSION: u32 = 1;

pub const MESSAGES_STORE: &str = "messages";
pub const CHANNELS_STORE: &str = "channels";

pub const MESSAGE_ID_INDEX: &str = "message_id";
pub const CHANNEL_ID_INDEX: &str = "channel_id";
pub const PARENT_MESSAGE_ID_INDEX: &str = "parent_message_id";
pub const TIMESTAMP_INDEX: &str = "timestamp";
pub const PINNED_INDEX: &str = "pinned";

/// Row primary key field
const ROW_ID: &str = "id";

/// A message as stored: the row id next to the message fields
#[derive(Debug, Serialize, Deserialize)]
struct MessageRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(flatten)]
    message: ChannelMessage,
}

impl MessageRow {
    fn into_value(self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        // Messages without a logical id yet must stay out of the unique index.
        if value.get(MESSAGE_ID_INDEX).and_then(Value::as_str) == Some("") {
            value[MESSAGE_ID_INDEX] = Value::Null;
        }
        Ok(value)
    }

    fn from_value(mut value: Value) -> Result<Self> {
        if value.get(MESSAGE_ID_INDEX).map_or(false, Value::is_null) {
            value[MESSAGE_ID_INDEX] = Value::from("");
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn upgrade_v1(up: &mut Upgrade<'_>) -> crate::error::Result<()> {
    up.create_store(MESSAGES_STORE, StoreOptions::key_path(ROW_ID).auto_increment())?;
    up.create_index(MESSAGES_STORE, MESSAGE_ID_INDEX, MESSAGE_ID_INDEX, true)?;
    up.create_index(MESSAGES_STORE, CHANNEL_ID_INDEX, CHANNEL_ID_INDEX, false)?;
    up.create_index(MESSAGES_STORE, PARENT_MESSAGE_ID_INDEX, PARENT_MESSAGE_ID_INDEX, false)?;
    up.create_index(MESSAGES_STORE, TIMESTAMP_INDEX, TIMESTAMP_INDEX, false)?;
    up.create_index(MESSAGES_STORE, PINNED_INDEX, PINNED_INDEX, false)?;
    up.create_store(CHANNELS_STORE, StoreOptions::key_path("id"))
}

fn uuid_of(key: &Key) -> Result<u64> {
    key.as_int()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| XxdkError::Storage(format!("row key {} is not a uuid", key)))
}

fn message_key(message_id: &MessageId) -> Key {
    Key::Text(message_id.to_base64())
}

fn message_not_found(message_id: &MessageId) -> XxdkError {
    XxdkError::NotFound(format!("message {}", message_id))
}

/// Persistent event model over an object-store database
pub struct ChannelStore {
    database: Arc<Database>,
    cipher: Option<Arc<dyn Cipher>>,
    callback: Arc<dyn MessageReceivedCallback>,
}

impl ChannelStore {
    /// Open (creating if needed) the channel database `name`.
    ///
    /// The database is recorded in `registry`, and its encryption status
    /// must match the one it was first opened with.
    pub async fn open(
        factory: &DatabaseFactory,
        name: &str,
        cipher: Option<Arc<dyn Cipher>>,
        registry: &dyn DatabaseRegistry,
        callback: Arc<dyn MessageReceivedCallback>,
    ) -> Result<Self> {
        let database = factory.open(name, DATABASE_VERSION, upgrade_v1)?;
        registry.store_database_name(name).await?;
        check_encryption_status(registry, name, cipher.is_some()).await?;

        if cipher.is_none() {
            warn!(database = name, "Channel database is not encrypted");
        }
        info!(database = name, version = database.version(), "Opened channel store");

        Ok(Self {
            database,
            cipher,
            callback,
        })
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    fn encrypt_text(&self, text: String) -> Result<String> {
        match &self.cipher {
            Some(cipher) => Ok(to_base64(&cipher.encrypt(text.as_bytes())?)),
            None => Ok(text),
        }
    }

    fn decrypt_text(&self, text: String) -> Result<String> {
        match &self.cipher {
            Some(cipher) => {
                let sealed = from_base64(&text)
                    .map_err(|e| XxdkError::Cipher(format!("stored text is not base64: {}", e)))?;
                let plain = cipher.decrypt(&sealed)?;
                String::from_utf8(plain)
                    .map_err(|e| XxdkError::Cipher(format!("decrypted text is not UTF-8: {}", e)))
            }
            None => Ok(text),
        }
    }

    fn to_model(&self, value: Value) -> Result<ModelMessage> {
        let row = MessageRow::from_value(value)?;
        let uuid = row
            .id
            .ok_or_else(|| XxdkError::Storage("stored message has no row id".into()))?;
        let mut message = row.message;
        message.text = self.decrypt_text(message.text)?;
        Ok(ModelMessage { uuid, message })
    }

    /// Insert a message, or return the row already holding its message id
    fn insert(&self, mut message: ChannelMessage) -> Result<u64> {
        let channel_id = message.channel_id.clone();
        let logical = message_key(&message.message_id);
        let has_logical_id = !message.message_id.as_bytes().is_empty();
        message.text = self.encrypt_text(message.text)?;
        let row = MessageRow { id: None, message }.into_value()?;

        let key = self.database.write(|tx| match tx.add(MESSAGES_STORE, row) {
            Ok(key) => Ok(key),
            Err(e) if e.is_constraint() && has_logical_id => {
                let existing = tx
                    .get_by_index(MESSAGES_STORE, MESSAGE_ID_INDEX, &logical)?
                    .and_then(|record| record.get(ROW_ID).and_then(Key::from_value));
                existing.ok_or(e)
            }
            Err(e) => Err(e),
        })?;

        let uuid = uuid_of(&key)?;
        debug!(uuid, channel = %channel_id, "Stored message");
        self.callback.message_received(uuid, &channel_id, false);
        Ok(uuid)
    }

    /// Apply `update` to one row inside a single write transaction
    fn update_row(
        &self,
        locate: impl FnOnce(&crate::object_store::Transaction<'_>) -> crate::error::Result<Option<Value>>,
        update: &MessageUpdate,
    ) -> Result<Option<(u64, ChannelId)>> {
        let updated = self.database.write(|tx| {
            let Some(value) = locate(tx)? else {
                return Ok(None);
            };
            let mut row = MessageRow::from_value(value)
                .map_err(|e| StateError::Serialization(e.to_string()))?;
            update.apply(&mut row.message);

            let uuid = row.id;
            let channel_id = row.message.channel_id.clone();
            let value = row
                .into_value()
                .map_err(|e| StateError::Serialization(e.to_string()))?;
            tx.put(MESSAGES_STORE, value)?;
            Ok(uuid.map(|uuid| (uuid, channel_id)))
        })?;

        if let Some((uuid, channel_id)) = &updated {
            debug!(uuid, channel = %channel_id, "Updated message");
            self.callback.message_received(*uuid, channel_id, true);
        }
        Ok(updated)
    }

    /// Every message of a channel, oldest first
    pub fn messages_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<ModelMessage>> {
        let records = self.database.read(|tx| {
            tx.cursor(
                MESSAGES_STORE,
                Some(CHANNEL_ID_INDEX),
                &KeyRange::only(channel_id.to_base64()),
                Direction::Next,
            )
        })?;
        let mut messages = records
            .into_iter()
            .map(|value| self.to_model(value))
            .collect::<Result<Vec<_>>>()?;
        messages.sort_by_key(|m| m.message.timestamp);
        Ok(messages)
    }

    pub fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel> {
        let value = self
            .database
            .read(|tx| tx.get(CHANNELS_STORE, &Key::Text(channel_id.to_base64())))?
            .ok_or_else(|| XxdkError::NotFound(format!("channel {}", channel_id)))?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl EventModel for ChannelStore {
    async fn join_channel(&self, channel: Channel) -> Result<()> {
        let value = serde_json::to_value(&channel)?;
        self.database.write(|tx| tx.put(CHANNELS_STORE, value))?;
        info!(channel = %channel.id, name = %channel.name, "Joined channel");
        Ok(())
    }

    async fn leave_channel(&self, channel_id: &ChannelId) -> Result<()> {
        let key = Key::Text(channel_id.to_base64());
        let removed = self.database.write(|tx| {
            tx.delete(CHANNELS_STORE, &key)?;
            tx.delete_by_index(MESSAGES_STORE, CHANNEL_ID_INDEX, &key)
        })?;
        info!(channel = %channel_id, messages = removed, "Left channel");
        Ok(())
    }

    async fn receive_message(&self, message: ChannelMessage) -> Result<u64> {
        self.insert(message)
    }

    async fn receive_reply(&self, mut message: ChannelMessage, reply_to: MessageId) -> Result<u64> {
        message.parent_message_id = Some(reply_to);
        self.insert(message)
    }

    async fn receive_reaction(&self, mut message: ChannelMessage, react_to: MessageId) -> Result<u64> {
        message.parent_message_id = Some(react_to);
        self.insert(message)
    }

    async fn update_from_uuid(&self, uuid: u64, update: MessageUpdate) -> Result<()> {
        let key = Key::from(uuid);
        self.update_row(|tx| tx.get(MESSAGES_STORE, &key), &update)?
            .ok_or_else(|| XxdkError::NotFound(format!("message row {}", uuid)))?;
        Ok(())
    }

    async fn update_from_message_id(
        &self,
        message_id: &MessageId,
        update: MessageUpdate,
    ) -> Result<u64> {
        let key = message_key(message_id);
        let (uuid, _) = self
            .update_row(|tx| tx.get_by_index(MESSAGES_STORE, MESSAGE_ID_INDEX, &key), &update)?
            .ok_or_else(|| message_not_found(message_id))?;
        Ok(uuid)
    }

    async fn get_message(&self, message_id: &MessageId) -> Result<ModelMessage> {
        let key = message_key(message_id);
        let value = self
            .database
            .read(|tx| tx.get_by_index(MESSAGES_STORE, MESSAGE_ID_INDEX, &key))?
            .ok_or_else(|| message_not_found(message_id))?;
        self.to_model(value)
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<()> {
        let key = message_key(message_id);
        let removed = self
            .database
            .write(|tx| tx.delete_by_index(MESSAGES_STORE, MESSAGE_ID_INDEX, &key))?;
        debug!(message = %message_id, removed, "Deleted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStorage;
    use crate::registry::LocalRegistry;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use xxdk_core::MessageStatus;

    type Seen = Arc<Mutex<Vec<(u64, bool)>>>;

    fn recorder() -> (Seen, Arc<dyn MessageReceivedCallback>) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback = move |uuid: u64, _: &ChannelId, update: bool| sink.lock().push((uuid, update));
        (seen, Arc::new(callback))
    }

    /// Reverses the bytes; enough to prove text is not stored in the clear
    struct ReverseCipher;

    impl Cipher for ReverseCipher {
        fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
            Ok(plaintext.iter().rev().copied().collect())
        }

        fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
            Ok(ciphertext.iter().rev().copied().collect())
        }

        fn marshal(&self) -> Result<Vec<u8>> {
            Ok(b"reverse".to_vec())
        }
    }

    fn message(id: &str, text: &str, at: i64) -> ChannelMessage {
        ChannelMessage::text(
            ChannelId::from(b"channel".to_vec()),
            MessageId::from(id.as_bytes().to_vec()),
            text,
            Utc.timestamp_millis_opt(at).unwrap(),
        )
    }

    async fn open(name: &str, cipher: Option<Arc<dyn Cipher>>) -> (ChannelStore, Seen) {
        let factory = DatabaseFactory::new();
        let registry = LocalRegistry::new(Arc::new(MemoryStorage::new()));
        let (seen, callback) = recorder();
        let store = ChannelStore::open(&factory, name, cipher, &registry, callback)
            .await
            .unwrap();
        (store, seen)
    }

    #[tokio::test]
    async fn test_insert_twice_delete_then_fetch() {
        let (store, seen) = open("test", None).await;

        let first = store.receive_message(message("m1", "hello", 1)).await.unwrap();
        let second = store.receive_message(message("m1", "hello", 1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(*seen.lock(), vec![(first, false), (first, false)]);

        store
            .delete_message(&MessageId::from(b"m1".to_vec()))
            .await
            .unwrap();
        let err = store
            .get_message(&MessageId::from(b"m1".to_vec()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_idempotent_insert_many_times() {
        let (store, _) = open("dupes", None).await;
        let original = store.receive_message(message("m1", "a", 1)).await.unwrap();
        for _ in 0..5 {
            assert_eq!(store.receive_message(message("m1", "a", 1)).await.unwrap(), original);
        }
        let other = store.receive_message(message("m2", "b", 2)).await.unwrap();
        assert_ne!(other, original);
    }

    #[tokio::test]
    async fn test_messages_without_id_do_not_collide() {
        let (store, _) = open("unsent", None).await;
        let a = store.receive_message(message("", "draft 1", 1)).await.unwrap();
        let b = store.receive_message(message("", "draft 2", 2)).await.unwrap();
        assert_ne!(a, b);

        store
            .update_from_uuid(a, MessageUpdate::default().with_message_id(MessageId::from(b"sent".to_vec())))
            .await
            .unwrap();
        let fetched = store.get_message(&MessageId::from(b"sent".to_vec())).await.unwrap();
        assert_eq!(fetched.uuid, a);
        assert_eq!(fetched.message.text, "draft 1");
    }

    #[tokio::test]
    async fn test_updates_notify_and_apply() {
        let (store, seen) = open("updates", None).await;
        let uuid = store.receive_message(message("m1", "hi", 1)).await.unwrap();

        store
            .update_from_uuid(uuid, MessageUpdate::default().with_status(MessageStatus::Delivered))
            .await
            .unwrap();
        let by_id = store
            .update_from_message_id(
                &MessageId::from(b"m1".to_vec()),
                MessageUpdate::default().with_pinned(true),
            )
            .await
            .unwrap();
        assert_eq!(by_id, uuid);

        let stored = store.get_message(&MessageId::from(b"m1".to_vec())).await.unwrap();
        assert_eq!(stored.message.status, MessageStatus::Delivered);
        assert!(stored.message.pinned);
        assert_eq!(*seen.lock(), vec![(uuid, false), (uuid, true), (uuid, true)]);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let (store, seen) = open("missing", None).await;
        let err = store
            .update_from_uuid(99, MessageUpdate::default().with_hidden(true))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_message_succeeds() {
        let (store, _) = open("empty", None).await;
        store
            .delete_message(&MessageId::from(b"ghost".to_vec()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reply_and_reaction_record_parent() {
        let (store, _) = open("threads", None).await;
        let parent = MessageId::from(b"root".to_vec());
        store.receive_message(message("root", "question", 1)).await.unwrap();
        store
            .receive_reply(message("r1", "answer", 2), parent.clone())
            .await
            .unwrap();
        store
            .receive_reaction(message("x1", "+1", 3), parent.clone())
            .await
            .unwrap();

        let children = store
            .database()
            .read(|tx| {
                tx.get_all_by_index(
                    MESSAGES_STORE,
                    PARENT_MESSAGE_ID_INDEX,
                    &Key::Text(parent.to_base64()),
                )
            })
            .unwrap();
        assert_eq!(children.len(), 2);
    }

    #[tokio::test]
    async fn test_join_and_leave_channel() {
        let (store, _) = open("membership", None).await;
        let channel = Channel {
            id: ChannelId::from(b"channel".to_vec()),
            name: "general".into(),
            description: String::new(),
        };
        store.join_channel(channel.clone()).await.unwrap();
        assert_eq!(store.get_channel(&channel.id).unwrap(), channel);

        store.receive_message(message("m1", "a", 2)).await.unwrap();
        store.receive_message(message("m2", "b", 1)).await.unwrap();
        let listed = store.messages_for_channel(&channel.id).unwrap();
        let texts: Vec<&str> = listed.iter().map(|m| m.message.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a"]);

        store.leave_channel(&channel.id).await.unwrap();
        assert!(store.get_channel(&channel.id).unwrap_err().is_not_found());
        assert!(store.messages_for_channel(&channel.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_text_is_encrypted_at_rest() {
        let (store, _) = open("secret", Some(Arc::new(ReverseCipher))).await;
        assert!(store.is_encrypted());
        store.receive_message(message("m1", "hello", 1)).await.unwrap();

        let raw = store
            .database()
            .read(|tx| tx.get_by_index(MESSAGES_STORE, MESSAGE_ID_INDEX, &message_key(&MessageId::from(b"m1".to_vec()))))
            .unwrap()
            .unwrap();
        assert_ne!(raw["text"], "hello");

        let fetched = store.get_message(&MessageId::from(b"m1".to_vec())).await.unwrap();
        assert_eq!(fetched.message.text, "hello");
    }

    #[tokio::test]
    async fn test_encryption_mismatch_on_reopen() {
        let factory = DatabaseFactory::new();
        let registry = LocalRegistry::new(Arc::new(MemoryStorage::new()));
        let (_, callback) = recorder();
        let cipher: Arc<dyn Cipher> = Arc::new(ReverseCipher);

        ChannelStore::open(&factory, "db", Some(cipher.clone()), &registry, callback.clone())
            .await
            .unwrap();
        ChannelStore::open(&factory, "db", Some(cipher), &registry, callback.clone())
            .await
            .unwrap();

        let err = ChannelStore::open(&factory, "db", None, &registry, callback)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            XxdkError::EncryptionMismatch {
                stored: true,
                requested: false,
                ..
            }
        ));
        assert_eq!(registry.database_names().unwrap(), vec!["db"]);
    }
}
