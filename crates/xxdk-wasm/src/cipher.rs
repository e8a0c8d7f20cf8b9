//! JavaScript cipher objects behind [`Cipher`] and [`CipherFactory`]
//!
//! JS objects cannot leave their thread, so they live in a thread-local
//! table and the Rust handles only carry a slot number. Dropping a handle
//! releases its slot for reuse. A cipher object has
//! `encrypt(Uint8Array)`, `decrypt(Uint8Array)` and `marshal()` methods,
//! each returning a `Uint8Array`; a factory has `restore(Uint8Array)`
//! returning a cipher object.

use std::cell::RefCell;
use std::sync::Arc;

use js_sys::{Function, Reflect, Uint8Array};
use wasm_bindgen::{JsCast, JsValue};
use xxdk_core::{Cipher, CipherFactory, Result, XxdkError};

use crate::slots::SlotTable;

thread_local! {
    static OBJECTS: RefCell<SlotTable<JsValue>> = const { RefCell::new(SlotTable::new()) };
}

fn register(object: JsValue) -> usize {
    OBJECTS.with(|objects| objects.borrow_mut().insert(object))
}

fn release(slot: usize) {
    // The table may already be gone during thread teardown.
    let _ = OBJECTS.try_with(|objects| {
        if let Ok(mut objects) = objects.try_borrow_mut() {
            objects.remove(slot);
        }
    });
}

fn lookup(slot: usize) -> Result<JsValue> {
    OBJECTS
        .with(|objects| objects.borrow().get(slot).cloned())
        .ok_or_else(|| XxdkError::Cipher("cipher is not available on this thread".into()))
}

/// Live JS objects held for ciphers and factories on this thread
pub fn live_objects() -> usize {
    OBJECTS.with(|objects| objects.borrow().len())
}

fn call(slot: usize, method: &str, arg: Option<&[u8]>) -> Result<JsValue> {
    let object = lookup(slot)?;
    let function = Reflect::get(&object, &JsValue::from_str(method))
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
        .ok_or_else(|| XxdkError::Cipher(format!("cipher object has no {} method", method)))?;
    let result = match arg {
        Some(bytes) => function.call1(&object, &Uint8Array::from(bytes)),
        None => function.call0(&object),
    };
    result.map_err(|e| XxdkError::Cipher(format!("{} threw: {:?}", method, e)))
}

fn bytes(method: &str, value: JsValue) -> Result<Vec<u8>> {
    value
        .dyn_into::<Uint8Array>()
        .map(|array| array.to_vec())
        .map_err(|_| XxdkError::Cipher(format!("{} did not return a Uint8Array", method)))
}

/// A JS cipher object
#[derive(Debug)]
pub struct JsCipher {
    slot: usize,
}

impl JsCipher {
    pub fn new(object: JsValue) -> Self {
        Self {
            slot: register(object),
        }
    }
}

impl Drop for JsCipher {
    fn drop(&mut self) {
        release(self.slot);
    }
}

impl Cipher for JsCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        bytes("encrypt", call(self.slot, "encrypt", Some(plaintext))?)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        bytes("decrypt", call(self.slot, "decrypt", Some(ciphertext))?)
    }

    fn marshal(&self) -> Result<Vec<u8>> {
        bytes("marshal", call(self.slot, "marshal", None)?)
    }
}

/// A JS object that rebuilds ciphers from their marshalled state
#[derive(Debug)]
pub struct JsCipherFactory {
    slot: usize,
}

impl JsCipherFactory {
    pub fn new(object: JsValue) -> Self {
        Self {
            slot: register(object),
        }
    }
}

impl Drop for JsCipherFactory {
    fn drop(&mut self) {
        release(self.slot);
    }
}

impl CipherFactory for JsCipherFactory {
    fn restore(&self, state: &[u8]) -> Result<Arc<dyn Cipher>> {
        let object = call(self.slot, "restore", Some(state))?;
        if object.is_undefined() || object.is_null() {
            return Err(XxdkError::Cipher("restore returned no cipher".into()));
        }
        Ok(Arc::new(JsCipher::new(object)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn test_dropped_cipher_releases_its_object() {
        let before = live_objects();
        let cipher = JsCipher::new(js_sys::Object::new().into());
        assert_eq!(live_objects(), before + 1);

        drop(cipher);
        assert_eq!(live_objects(), before);
        for _ in 0..100 {
            drop(JsCipher::new(JsValue::NULL));
        }
        assert_eq!(live_objects(), before);
    }

    #[wasm_bindgen_test]
    fn test_released_slot_is_unavailable() {
        let cipher = JsCipher::new(js_sys::Object::new().into());
        let slot = cipher.slot;
        drop(cipher);
        assert!(matches!(lookup(slot), Err(XxdkError::Cipher(_))));
    }
}
