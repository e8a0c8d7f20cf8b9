//! `localStorage`-backed key/value store
//!
//! Values are stored as base64 text under `prefix + key`, so several
//! applications can share one origin's storage. `localStorage` only exists
//! on the main thread; inside a Worker every operation fails with a storage
//! error.

use xxdk_core::encoding::{from_base64, to_base64};
use xxdk_state::StateError;

/// Zero-state handle; the browser storage object is looked up per call
#[derive(Debug, Clone)]
pub struct LocalStorage {
    prefix: String,
}

impl LocalStorage {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

pub(crate) fn prefixed(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}

/// The application key for a raw storage key, if it belongs to `prefix`
pub(crate) fn unprefixed<'a>(prefix: &str, raw: &'a str) -> Option<&'a str> {
    raw.strip_prefix(prefix)
}

pub(crate) fn decode_value(key: &str, text: &str) -> Result<Vec<u8>, StateError> {
    from_base64(text).map_err(|e| StateError::Storage(format!("corrupt value for {}: {}", key, e)))
}

pub(crate) fn encode_value(value: &[u8]) -> String {
    to_base64(value)
}

#[cfg(target_arch = "wasm32")]
mod browser {
    use wasm_bindgen::JsValue;
    use web_sys::Storage;
    use xxdk_state::{KeyValueStore, Result, StateError};

    use super::*;

    fn js_error(context: &str, err: JsValue) -> StateError {
        StateError::Storage(format!("{}: {:?}", context, err))
    }

    impl LocalStorage {
        fn storage(&self) -> Result<Storage> {
            web_sys::window()
                .ok_or_else(|| StateError::Storage("localStorage is only available on the main thread".into()))?
                .local_storage()
                .map_err(|e| js_error("localStorage", e))?
                .ok_or_else(|| StateError::Storage("localStorage is disabled".into()))
        }
    }

    impl KeyValueStore for LocalStorage {
        fn get(&self, key: &str) -> Result<Vec<u8>> {
            let text = self
                .storage()?
                .get_item(&prefixed(&self.prefix, key))
                .map_err(|e| js_error("getItem", e))?
                .ok_or_else(|| StateError::not_found("key", key))?;
            decode_value(key, &text)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            self.storage()?
                .set_item(&prefixed(&self.prefix, key), &encode_value(value))
                .map_err(|e| js_error("setItem", e))
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.storage()?
                .remove_item(&prefixed(&self.prefix, key))
                .map_err(|e| js_error("removeItem", e))
        }

        /// Removes only keys under this store's prefix
        fn clear(&self) -> Result<()> {
            self.clear_prefix("").map(|_| ())
        }

        fn clear_prefix(&self, prefix: &str) -> Result<usize> {
            let doomed: Vec<String> = self
                .keys()?
                .into_iter()
                .filter(|key| key.starts_with(prefix))
                .collect();
            for key in &doomed {
                self.remove(key)?;
            }
            Ok(doomed.len())
        }

        fn keys(&self) -> Result<Vec<String>> {
            let storage = self.storage()?;
            let len = storage.length().map_err(|e| js_error("length", e))?;
            let mut keys = Vec::new();
            for i in 0..len {
                if let Some(raw) = storage.key(i).map_err(|e| js_error("key", e))? {
                    if let Some(key) = unprefixed(&self.prefix, &raw) {
                        keys.push(key.to_string());
                    }
                }
            }
            Ok(keys)
        }
    }
}
