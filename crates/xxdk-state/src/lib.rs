//! xxdk State - Channel event model storage
//!
//! This crate provides the persistence side of the channels event model and
//! both halves of its split across the thread boundary.
//!
//! ## Components
//!
//! - **object_store**: versioned databases with indexed object stores and
//!   atomic transactions
//! - **kv**: key/value storage boundary (`localStorage` in the browser)
//! - **registry**: per-database encryption status and the list of databases
//! - **channels**: the storage-backed [`EventModel`](xxdk_core::EventModel)
//! - **worker**: Worker-side handler set driving a [`ChannelStore`]
//! - **remote**: main-thread proxy forwarding every model call to the Worker
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xxdk_core::{ChannelId, EventModel, WorkerConfig};
//! use xxdk_state::{ChannelsWorker, DatabaseFactory, LocalRegistry, MemoryStorage, RemoteEventModel};
//! use xxdk_worker::{memory_pair, WorkerManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ((main_tx, main_rx), (worker_tx, worker_rx)) = memory_pair();
//!     let config = WorkerConfig::default();
//!
//!     // Worker thread
//!     let worker = WorkerManager::new("channels", worker_tx, worker_rx, config.clone());
//!     ChannelsWorker::new(worker, Arc::new(DatabaseFactory::new())).start()?;
//!
//!     // Main thread
//!     let main = WorkerManager::new("main", main_tx, main_rx, config);
//!     let registry = LocalRegistry::new(Arc::new(MemoryStorage::new()));
//!     let callback = Arc::new(|uuid: u64, channel: &ChannelId, update: bool| {
//!         println!("message {} in {} (update: {})", uuid, channel, update);
//!     });
//!     let model = RemoteEventModel::new(main, registry, "db", None, callback).await?;
//!     model.delete_message(&b"m1".to_vec().into()).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod channels;
pub mod error;
pub mod kv;
pub mod object_store;
pub mod registry;
pub mod remote;
pub mod worker;

mod wire;

// Re-exports for convenience
pub use channels::ChannelStore;
pub use error::{Result, StateError};
pub use kv::{KeyValueStore, MemoryStorage};
pub use object_store::{
    Database, DatabaseFactory, Direction, Key, KeyRange, StoreOptions, Transaction, Upgrade,
};
pub use registry::{DatabaseRegistry, LocalRegistry, RemoteRegistry};
pub use remote::RemoteEventModel;
pub use worker::ChannelsWorker;
