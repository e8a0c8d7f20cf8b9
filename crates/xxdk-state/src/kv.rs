//! Key/value storage boundary
//!
//! In the browser this is `localStorage`, which only exists on the main
//! thread. Natively and in tests [`MemoryStorage`] stands in for it.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StateError};

/// Narrow persistent string-keyed byte store
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value; missing keys are [`StateError::NotFound`]
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key
    fn clear(&self) -> Result<()>;

    /// Remove every key starting with `prefix`, returning how many went
    fn clear_prefix(&self, prefix: &str) -> Result<usize>;

    fn keys(&self) -> Result<Vec<String>>;

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T>
    where
        Self: Sized,
    {
        Ok(serde_json::from_slice(&self.get(key)?)?)
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()>
    where
        Self: Sized,
    {
        self.set(key, &serde_json::to_vec(value)?)
    }
}

/// In-memory key/value store
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::not_found("key", key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_is_not_found() {
        let storage = MemoryStorage::new();
        assert!(matches!(storage.get("nope"), Err(StateError::NotFound { .. })));
    }

    #[test]
    fn test_set_get_remove() {
        let storage = MemoryStorage::new();
        storage.set("a", b"1").unwrap();
        assert_eq!(storage.get("a").unwrap(), b"1");

        storage.remove("a").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_clear_prefix() {
        let storage = MemoryStorage::new();
        storage.set("EncryptionStatus/a", b"true").unwrap();
        storage.set("EncryptionStatus/b", b"false").unwrap();
        storage.set("other", b"x").unwrap();

        assert_eq!(storage.clear_prefix("EncryptionStatus/").unwrap(), 2);
        assert_eq!(storage.keys().unwrap(), vec!["other".to_string()]);
    }

    #[test]
    fn test_json_helpers() {
        let storage = MemoryStorage::new();
        storage.set_json("list", &vec!["x", "y"]).unwrap();
        let list: Vec<String> = storage.get_json("list").unwrap();
        assert_eq!(list, vec!["x", "y"]);
    }
}
