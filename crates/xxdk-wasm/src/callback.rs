//! JS message notifications
//!
//! Handlers run behind `Send` bounds, so notifications travel through a
//! channel to a local task that owns the JS function.

use std::sync::Arc;

use js_sys::{Function, Uint8Array};
use tokio::sync::mpsc;
use tracing::warn;
use wasm_bindgen::JsValue;
use xxdk_core::{ChannelId, MessageReceivedCallback};

/// Wrap `function(uuid, channelId, update)` as a [`MessageReceivedCallback`]
pub(crate) fn message_received(function: Function) -> Arc<dyn MessageReceivedCallback> {
    let (tx, mut rx) = mpsc::unbounded_channel::<(u64, ChannelId, bool)>();

    wasm_bindgen_futures::spawn_local(async move {
        while let Some((uuid, channel_id, update)) = rx.recv().await {
            let result = function.call3(
                &JsValue::NULL,
                &JsValue::from_f64(uuid as f64),
                &Uint8Array::from(channel_id.as_bytes()),
                &JsValue::from_bool(update),
            );
            if let Err(e) = result {
                warn!(uuid, error = ?e, "Message callback threw");
            }
        }
    });

    Arc::new(move |uuid: u64, channel_id: &ChannelId, update: bool| {
        let _ = tx.send((uuid, channel_id.clone(), update));
    })
}
