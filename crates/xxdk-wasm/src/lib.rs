//! xxdk WASM - Browser bindings for the worker channels
//!
//! Runs the channels event model and the log file in dedicated Web Workers
//! and drives them from the main thread over `postMessage`.
//!
//! ## JavaScript usage
//!
//! Main thread:
//!
//! ```js
//! import init, { newChannelsEventModelWorker } from "./xxdk_wasm.js";
//! await init();
//! const model = await newChannelsEventModelWorker(
//!     "./channels-worker.js", "db", undefined,
//!     (uuid, channelId, update) => console.log(uuid, update),
//! );
//! const uuid = await model.receiveMessage(message);
//! ```
//!
//! Worker script (`channels-worker.js`):
//!
//! ```js
//! import init, { startChannelsWorker } from "./xxdk_wasm.js";
//! await init();
//! startChannelsWorker();
//! ```

pub mod console;
pub mod storage;

#[cfg(target_arch = "wasm32")]
mod bindings;
#[cfg(target_arch = "wasm32")]
mod callback;
#[cfg(target_arch = "wasm32")]
pub mod cipher;
#[cfg(any(target_arch = "wasm32", test))]
mod slots;
#[cfg(target_arch = "wasm32")]
mod transport;

#[cfg(target_arch = "wasm32")]
pub use bindings::{ChannelsEventModel, LogFile};
#[cfg(target_arch = "wasm32")]
pub use cipher::{JsCipher, JsCipherFactory};
pub use console::{init_logging, MakeConsoleWriter};
pub use storage::LocalStorage;
