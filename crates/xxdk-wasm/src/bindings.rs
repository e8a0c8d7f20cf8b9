//! JavaScript exports
//!
//! `new*Worker` functions run on the main thread: they spawn a module
//! Worker from a script URL, wait for its Ready signal and resolve to a
//! handle. `start*Worker` functions run inside that Worker script and
//! register its handlers.

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;
use std::sync::Arc;

use js_sys::{Function, Promise, Uint8Array};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::future_to_promise;
use web_sys::{DedicatedWorkerGlobalScope, Worker, WorkerOptions, WorkerType};
use xxdk_core::{Channel, ChannelMessage, Cipher, Config, EventModel, MessageUpdate, XxdkError};
use xxdk_logging::{LogFileWorker, RemoteLogFile};
use xxdk_state::{ChannelsWorker, DatabaseFactory, LocalRegistry, RemoteEventModel};
use xxdk_worker::WorkerManager;

use crate::callback;
use crate::cipher::{JsCipher, JsCipherFactory};
use crate::console::init_logging;
use crate::storage::LocalStorage;
use crate::transport::connect;

thread_local! {
    /// Worker-side managers stay alive for the life of the Worker
    static RUNNING: RefCell<Vec<WorkerManager>> = const { RefCell::new(Vec::new()) };
}

fn js_error(err: impl Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

/// JS `Error` whose `name` is the error code
fn xxdk_error(err: XxdkError) -> JsValue {
    let error = js_sys::Error::new(&err.to_string());
    error.set_name(err.error_code());
    error.into()
}

fn is_absent(value: &JsValue) -> bool {
    value.is_undefined() || value.is_null()
}

fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(js_error)
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(js_error)
}

/// Defaults, or a (partial) configuration object from JS
fn config_from_js(value: JsValue) -> Result<Config, JsValue> {
    let config = if is_absent(&value) {
        Config::default()
    } else {
        from_js::<Config>(value)?
    };
    config.validate().map_err(xxdk_error)?;
    Ok(config)
}

fn spawn_worker(url: &str, name: &str) -> Result<Worker, JsValue> {
    let options = WorkerOptions::new();
    options.set_type(WorkerType::Module);
    options.set_name(name);
    Worker::new_with_options(url, &options)
}

fn worker_scope() -> Result<DedicatedWorkerGlobalScope, JsValue> {
    js_sys::global()
        .dyn_into::<DedicatedWorkerGlobalScope>()
        .map_err(|_| js_error("must be called inside a dedicated Worker"))
}

fn keep_alive(manager: WorkerManager) {
    RUNNING.with(|running| running.borrow_mut().push(manager));
}

/// Install console logging on the main thread
#[wasm_bindgen(js_name = initLogging)]
pub fn init_console_logging(config: JsValue) -> Result<(), JsValue> {
    let config = config_from_js(config)?;
    init_logging(&config.logging, None).map_err(xxdk_error)
}

/// Spawn the channels Worker at `workerUrl` and open `databaseName` in it.
///
/// `cipher` is an optional JS cipher object; `callback(uuid, channelId,
/// update)` fires for every stored or updated message. Resolves to a
/// [`ChannelsEventModel`].
#[wasm_bindgen(js_name = newChannelsEventModelWorker)]
pub fn new_channels_event_model_worker(
    worker_url: String,
    database_name: String,
    cipher: JsValue,
    callback: Function,
    config: JsValue,
) -> Result<Promise, JsValue> {
    let config = config_from_js(config)?;
    let worker = spawn_worker(&worker_url, "channelsIndexedDb")?;
    let (transport, inbound) = connect("channels", worker);
    let manager = WorkerManager::new("channels-main", transport, inbound, config.worker.clone());

    let registry = LocalRegistry::new(Arc::new(LocalStorage::new(config.storage.key_prefix)));
    let cipher: Option<Arc<dyn Cipher>> = if is_absent(&cipher) {
        None
    } else {
        Some(Arc::new(JsCipher::new(cipher)))
    };
    let callback = callback::message_received(callback);

    Ok(future_to_promise(async move {
        let model = RemoteEventModel::new(manager, registry, &database_name, cipher, callback)
            .await
            .map_err(xxdk_error)?;
        Ok(ChannelsEventModel {
            model: Rc::new(model),
        }
        .into())
    }))
}

/// Register the channels handlers inside the Worker script.
///
/// `cipherFactory` is required only for encrypted databases.
#[wasm_bindgen(js_name = startChannelsWorker)]
pub fn start_channels_worker(cipher_factory: JsValue, config: JsValue) -> Result<(), JsValue> {
    let config = config_from_js(config)?;
    init_logging(&config.logging, None).map_err(xxdk_error)?;

    let (transport, inbound) = connect("channels", worker_scope()?);
    let manager = WorkerManager::new("channels-worker", transport, inbound, config.worker);

    let mut worker = ChannelsWorker::new(manager.clone(), Arc::new(DatabaseFactory::new()));
    if !is_absent(&cipher_factory) {
        worker = worker.with_cipher_factory(Arc::new(JsCipherFactory::new(cipher_factory)));
    }
    worker.start().map_err(xxdk_error)?;
    keep_alive(manager);
    info!("Channels worker started");
    Ok(())
}

/// Spawn the log file Worker at `workerUrl` with a buffer of `maxSize`
/// bytes (the configured default when omitted). Resolves to a [`LogFile`].
#[wasm_bindgen(js_name = newLogFileWorker)]
pub fn new_log_file_worker(
    worker_url: String,
    name: String,
    max_size: Option<u32>,
    config: JsValue,
) -> Result<Promise, JsValue> {
    let config = config_from_js(config)?;
    let max_size = max_size
        .map(|size| size as usize)
        .unwrap_or(config.logging.log_file_max_size);
    let worker = spawn_worker(&worker_url, "logger")?;
    let (transport, inbound) = connect("logger", worker);
    let manager = WorkerManager::new("logger-main", transport, inbound, config.worker);

    Ok(future_to_promise(async move {
        let file = RemoteLogFile::new(manager, &name, max_size)
            .await
            .map_err(xxdk_error)?;
        Ok(LogFile { file }.into())
    }))
}

/// Register the log file handlers inside the Worker script
#[wasm_bindgen(js_name = startLogFileWorker)]
pub fn start_log_file_worker(config: JsValue) -> Result<(), JsValue> {
    let config = config_from_js(config)?;
    let (transport, inbound) = connect("logger", worker_scope()?);
    let manager = WorkerManager::new("logger-worker", transport, inbound, config.worker);
    LogFileWorker::new(manager.clone())
        .start()
        .map_err(xxdk_error)?;
    keep_alive(manager);
    Ok(())
}

/// Main-thread handle to the channels event model
#[wasm_bindgen]
pub struct ChannelsEventModel {
    model: Rc<RemoteEventModel>,
}

#[wasm_bindgen]
impl ChannelsEventModel {
    #[wasm_bindgen(getter, js_name = databaseName)]
    pub fn database_name(&self) -> String {
        self.model.database_name().to_string()
    }

    #[wasm_bindgen(js_name = joinChannel)]
    pub fn join_channel(&self, channel: JsValue) -> Result<Promise, JsValue> {
        let channel: Channel = from_js(channel)?;
        let model = self.model.clone();
        Ok(future_to_promise(async move {
            model.join_channel(channel).await.map_err(xxdk_error)?;
            Ok(JsValue::UNDEFINED)
        }))
    }

    #[wasm_bindgen(js_name = leaveChannel)]
    pub fn leave_channel(&self, channel_id: Vec<u8>) -> Promise {
        let model = self.model.clone();
        future_to_promise(async move {
            model
                .leave_channel(&channel_id.into())
                .await
                .map_err(xxdk_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Resolves to the row id
    #[wasm_bindgen(js_name = receiveMessage)]
    pub fn receive_message(&self, message: JsValue) -> Result<Promise, JsValue> {
        let message: ChannelMessage = from_js(message)?;
        let model = self.model.clone();
        Ok(future_to_promise(async move {
            let uuid = model.receive_message(message).await.map_err(xxdk_error)?;
            Ok(JsValue::from_f64(uuid as f64))
        }))
    }

    #[wasm_bindgen(js_name = receiveReply)]
    pub fn receive_reply(&self, message: JsValue, reply_to: Vec<u8>) -> Result<Promise, JsValue> {
        let message: ChannelMessage = from_js(message)?;
        let model = self.model.clone();
        Ok(future_to_promise(async move {
            let uuid = model
                .receive_reply(message, reply_to.into())
                .await
                .map_err(xxdk_error)?;
            Ok(JsValue::from_f64(uuid as f64))
        }))
    }

    #[wasm_bindgen(js_name = receiveReaction)]
    pub fn receive_reaction(&self, message: JsValue, react_to: Vec<u8>) -> Result<Promise, JsValue> {
        let message: ChannelMessage = from_js(message)?;
        let model = self.model.clone();
        Ok(future_to_promise(async move {
            let uuid = model
                .receive_reaction(message, react_to.into())
                .await
                .map_err(xxdk_error)?;
            Ok(JsValue::from_f64(uuid as f64))
        }))
    }

    #[wasm_bindgen(js_name = updateFromUuid)]
    pub fn update_from_uuid(&self, uuid: f64, update: JsValue) -> Result<Promise, JsValue> {
        let update: MessageUpdate = from_js(update)?;
        let model = self.model.clone();
        Ok(future_to_promise(async move {
            model
                .update_from_uuid(uuid as u64, update)
                .await
                .map_err(xxdk_error)?;
            Ok(JsValue::UNDEFINED)
        }))
    }

    /// Resolves to the row id of the updated message
    #[wasm_bindgen(js_name = updateFromMessageId)]
    pub fn update_from_message_id(
        &self,
        message_id: Vec<u8>,
        update: JsValue,
    ) -> Result<Promise, JsValue> {
        let update: MessageUpdate = from_js(update)?;
        let model = self.model.clone();
        Ok(future_to_promise(async move {
            let uuid = model
                .update_from_message_id(&message_id.into(), update)
                .await
                .map_err(xxdk_error)?;
            Ok(JsValue::from_f64(uuid as f64))
        }))
    }

    #[wasm_bindgen(js_name = getMessage)]
    pub fn get_message(&self, message_id: Vec<u8>) -> Promise {
        let model = self.model.clone();
        future_to_promise(async move {
            let message = model
                .get_message(&message_id.into())
                .await
                .map_err(xxdk_error)?;
            to_js(&message)
        })
    }

    #[wasm_bindgen(js_name = deleteMessage)]
    pub fn delete_message(&self, message_id: Vec<u8>) -> Promise {
        let model = self.model.clone();
        future_to_promise(async move {
            model
                .delete_message(&message_id.into())
                .await
                .map_err(xxdk_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Stop the receive loop; the handle is unusable afterwards
    pub fn close(&self) {
        self.model.manager().shutdown();
    }
}

/// Main-thread handle to the log file Worker
#[wasm_bindgen]
pub struct LogFile {
    file: RemoteLogFile,
}

#[wasm_bindgen]
impl LogFile {
    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.file.name().to_string()
    }

    #[wasm_bindgen(getter, js_name = maxSize)]
    pub fn max_size(&self) -> u32 {
        self.file.max_size() as u32
    }

    pub fn write(&self, data: &[u8]) -> Result<(), JsValue> {
        self.file.write(data).map_err(xxdk_error)
    }

    /// Resolves to a `Uint8Array` with the whole log
    #[wasm_bindgen(js_name = getFile)]
    pub fn get_file(&self) -> Promise {
        let file = self.file.clone();
        future_to_promise(async move {
            let contents = file.get_file().await.map_err(xxdk_error)?;
            Ok(Uint8Array::from(contents.as_slice()).into())
        })
    }

    pub fn size(&self) -> Promise {
        let file = self.file.clone();
        future_to_promise(async move {
            let size = file.size().await.map_err(xxdk_error)?;
            Ok(JsValue::from_f64(size as f64))
        })
    }

    /// Install console logging and mirror every line into this log file
    #[wasm_bindgen(js_name = mirrorLogs)]
    pub fn mirror_logs(&self, config: JsValue) -> Result<(), JsValue> {
        let config = config_from_js(config)?;
        init_logging(&config.logging, Some(self.file.clone())).map_err(xxdk_error)
    }
}
