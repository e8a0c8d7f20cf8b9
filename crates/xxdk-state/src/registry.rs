//! Database registry
//!
//! Two facts about every database outlive it in key/value storage: whether
//! it was created encrypted, and that it exists at all. The encryption
//! status is first-write-wins, so a database created unencrypted can never
//! be reopened with a cipher (or the reverse) without the mismatch being
//! caught.
//!
//! Key/value storage lives on the main thread, so a Worker records these
//! facts through [`RemoteRegistry`], which asks the main thread's
//! [`LocalRegistry`] over the worker channel.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use xxdk_core::{Result, XxdkError};
use xxdk_protocol::decode_payload;
use xxdk_protocol::messages::{
    EncryptionStatusMessage, EncryptionStatusReply, StoreDatabaseNameMessage,
};
use xxdk_protocol::Tag;
use xxdk_worker::WorkerManager;

use crate::error::StateError;
use crate::kv::KeyValueStore;
use crate::wire;

/// Key prefix for stored encryption statuses
pub const ENCRYPTION_STATUS_PREFIX: &str = "EncryptionStatus/";

/// Key holding the JSON list of created database names
pub const DATABASE_LIST_KEY: &str = "xxdkDatabaseList";

/// Persists per-database facts
#[async_trait]
pub trait DatabaseRegistry: Send + Sync {
    /// Record `encrypted` unless a status is already stored; returns the
    /// stored status either way
    async fn store_encryption_status(&self, database: &str, encrypted: bool) -> Result<bool>;

    /// Add `database` to the list of created databases
    async fn store_database_name(&self, database: &str) -> Result<()>;
}

/// Registry backed directly by key/value storage
#[derive(Clone)]
pub struct LocalRegistry {
    storage: Arc<dyn KeyValueStore>,
}

impl LocalRegistry {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// The stored encryption status, if any
    pub fn encryption_status(&self, database: &str) -> Result<Option<bool>> {
        match self.storage.get(&status_key(database)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StateError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn database_names(&self) -> Result<Vec<String>> {
        match self.storage.get(DATABASE_LIST_KEY) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(StateError::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn record_encryption_status(&self, database: &str, encrypted: bool) -> Result<bool> {
        if let Some(stored) = self.encryption_status(database)? {
            debug!(database, stored, requested = encrypted, "Encryption status already recorded");
            return Ok(stored);
        }
        self.storage
            .set(&status_key(database), &serde_json::to_vec(&encrypted)?)?;
        info!(database, encrypted, "Recorded encryption status");
        Ok(encrypted)
    }

    fn record_database_name(&self, database: &str) -> Result<()> {
        let mut names = self.database_names()?;
        if names.iter().any(|name| name == database) {
            return Ok(());
        }
        names.push(database.to_string());
        self.storage
            .set(DATABASE_LIST_KEY, &serde_json::to_vec(&names)?)?;
        Ok(())
    }

    /// Answer a Worker's `EncryptionStatus` and `StoreDatabaseName` calls
    pub fn serve(&self, manager: &WorkerManager) {
        let registry = self.clone();
        manager.register_handler(Tag::ENCRYPTION_STATUS, move |data| {
            let registry = registry.clone();
            async move {
                wire::reply(
                    decode_payload::<EncryptionStatusMessage>(&data).and_then(|msg| {
                        registry
                            .record_encryption_status(&msg.database_name, msg.encryption_status)
                            .map(|encryption_status| EncryptionStatusReply { encryption_status })
                    }),
                )
            }
        });

        let registry = self.clone();
        manager.register_handler(Tag::STORE_DATABASE_NAME, move |data| {
            let registry = registry.clone();
            async move {
                wire::reply_empty(
                    decode_payload::<StoreDatabaseNameMessage>(&data)
                        .and_then(|msg| registry.record_database_name(&msg.database_name)),
                )
            }
        });
    }
}

#[async_trait]
impl DatabaseRegistry for LocalRegistry {
    async fn store_encryption_status(&self, database: &str, encrypted: bool) -> Result<bool> {
        self.record_encryption_status(database, encrypted)
    }

    async fn store_database_name(&self, database: &str) -> Result<()> {
        self.record_database_name(database)
    }
}

/// Registry that forwards to the main thread's [`LocalRegistry`]
#[derive(Clone)]
pub struct RemoteRegistry {
    manager: WorkerManager,
}

impl RemoteRegistry {
    pub fn new(manager: WorkerManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl DatabaseRegistry for RemoteRegistry {
    async fn store_encryption_status(&self, database: &str, encrypted: bool) -> Result<bool> {
        let request = EncryptionStatusMessage {
            database_name: database.to_string(),
            encryption_status: encrypted,
        };
        let reply: EncryptionStatusReply =
            wire::call(&self.manager, Tag::ENCRYPTION_STATUS, &request).await?;
        Ok(reply.encryption_status)
    }

    async fn store_database_name(&self, database: &str) -> Result<()> {
        let request = StoreDatabaseNameMessage {
            database_name: database.to_string(),
        };
        wire::call_empty(&self.manager, Tag::STORE_DATABASE_NAME, &request).await
    }
}

/// Fail with [`XxdkError::EncryptionMismatch`] unless the stored status
/// matches the requested one
pub async fn check_encryption_status(
    registry: &dyn DatabaseRegistry,
    database: &str,
    encrypted: bool,
) -> Result<()> {
    let stored = registry.store_encryption_status(database, encrypted).await?;
    if stored != encrypted {
        return Err(XxdkError::EncryptionMismatch {
            database: database.to_string(),
            stored,
            requested: encrypted,
        });
    }
    Ok(())
}

fn status_key(database: &str) -> String {
    format!("{}{}", ENCRYPTION_STATUS_PREFIX, database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStorage;

    fn registry() -> LocalRegistry {
        LocalRegistry::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_encryption_status_first_write_wins() {
        let registry = registry();
        assert_eq!(registry.encryption_status("db").unwrap(), None);

        assert!(!registry.store_encryption_status("db", false).await.unwrap());
        assert!(!registry.store_encryption_status("db", true).await.unwrap());
        assert_eq!(registry.encryption_status("db").unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_mismatch_check() {
        let registry = registry();
        check_encryption_status(&registry, "db", true).await.unwrap();
        check_encryption_status(&registry, "db", true).await.unwrap();

        let err = check_encryption_status(&registry, "db", false)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            XxdkError::EncryptionMismatch {
                database: "db".into(),
                stored: true,
                requested: false
            }
        );
    }

    #[tokio::test]
    async fn test_database_names_are_unique() {
        let registry = registry();
        registry.store_database_name("a").await.unwrap();
        registry.store_database_name("b").await.unwrap();
        registry.store_database_name("a").await.unwrap();
        assert_eq!(registry.database_names().unwrap(), vec!["a", "b"]);
    }
}
