//! `postMessage` transport
//!
//! The browser handles are not `Send`, so the manager writes into a
//! [`QueueTransport`] and a local pump task posts each frame. Text frames
//! are posted as strings; binary frames as a `Uint8Array` whose buffer goes
//! in the transfer list. `message` and `messageerror` events feed the
//! manager's inbound queue.

use js_sys::{Array, ArrayBuffer, Uint8Array};
use tracing::{debug, error};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{DedicatedWorkerGlobalScope, MessageEvent, Worker};
use xxdk_protocol::Frame;
use xxdk_worker::{inbound_channel, Inbound, InboundReceiver, QueueTransport};

/// Either end of a `postMessage` link
pub(crate) trait MessagePort: 'static {
    fn post(&self, message: &JsValue) -> Result<(), JsValue>;
    fn post_with_transfer(&self, message: &JsValue, transfer: &JsValue) -> Result<(), JsValue>;
    fn set_onmessage(&self, handler: Option<&js_sys::Function>);
    fn set_onmessageerror(&self, handler: Option<&js_sys::Function>);
}

impl MessagePort for Worker {
    fn post(&self, message: &JsValue) -> Result<(), JsValue> {
        self.post_message(message)
    }

    fn post_with_transfer(&self, message: &JsValue, transfer: &JsValue) -> Result<(), JsValue> {
        self.post_message_with_transfer(message, transfer)
    }

    fn set_onmessage(&self, handler: Option<&js_sys::Function>) {
        Worker::set_onmessage(self, handler)
    }

    fn set_onmessageerror(&self, handler: Option<&js_sys::Function>) {
        Worker::set_onmessageerror(self, handler)
    }
}

impl MessagePort for DedicatedWorkerGlobalScope {
    fn post(&self, message: &JsValue) -> Result<(), JsValue> {
        self.post_message(message)
    }

    fn post_with_transfer(&self, message: &JsValue, transfer: &JsValue) -> Result<(), JsValue> {
        self.post_message_with_transfer(message, transfer)
    }

    fn set_onmessage(&self, handler: Option<&js_sys::Function>) {
        DedicatedWorkerGlobalScope::set_onmessage(self, handler)
    }

    fn set_onmessageerror(&self, handler: Option<&js_sys::Function>) {
        DedicatedWorkerGlobalScope::set_onmessageerror(self, handler)
    }
}

/// Read a frame out of a posted value
pub(crate) fn frame_from_js(data: &JsValue) -> Option<Frame> {
    if let Some(text) = data.as_string() {
        return Some(Frame::Text(text));
    }
    if let Some(bytes) = data.dyn_ref::<Uint8Array>() {
        return Some(Frame::Binary(bytes.to_vec()));
    }
    if let Some(buffer) = data.dyn_ref::<ArrayBuffer>() {
        return Some(Frame::Binary(Uint8Array::new(buffer).to_vec()));
    }
    None
}

fn post_frame(port: &impl MessagePort, frame: Frame) -> Result<(), JsValue> {
    match frame {
        Frame::Text(text) => port.post(&JsValue::from_str(&text)),
        Frame::Binary(bytes) => {
            let array = Uint8Array::from(bytes.as_slice());
            let transfer = Array::of1(&array.buffer());
            port.post_with_transfer(&array, &transfer)
        }
    }
}

/// Wire `port` up to a new transport and inbound queue for a
/// [`WorkerManager`](xxdk_worker::WorkerManager)
pub(crate) fn connect<P: MessagePort>(name: &str, port: P) -> (QueueTransport, InboundReceiver) {
    let (inbound_tx, inbound_rx) = inbound_channel();

    let tx = inbound_tx.clone();
    let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
        let item = match frame_from_js(&event.data()) {
            Some(frame) => Inbound::Frame(frame),
            None => Inbound::MessageError("unsupported message payload".into()),
        };
        let _ = tx.send(item);
    });
    port.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget();

    let onmessageerror = Closure::<dyn FnMut(MessageEvent)>::new(move |_: MessageEvent| {
        let _ = inbound_tx.send(Inbound::MessageError("messageerror event".into()));
    });
    port.set_onmessageerror(Some(onmessageerror.as_ref().unchecked_ref()));
    onmessageerror.forget();

    let (transport, mut outbound) = QueueTransport::new();
    let endpoint = name.to_string();
    wasm_bindgen_futures::spawn_local(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = post_frame(&port, frame) {
                error!(%endpoint, error = ?e, "postMessage failed");
            }
        }
        debug!(%endpoint, "Outbound pump stopped");
    });

    (transport, inbound_rx)
}
