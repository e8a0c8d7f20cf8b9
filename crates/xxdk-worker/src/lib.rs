//! xxdk Worker - Tagged request/response channel between threads
//!
//! The main thread and a Worker share no memory; they exchange
//! [`Envelope`](xxdk_protocol::Envelope)s over a [`Transport`]. This crate
//! provides both ends of that exchange.
//!
//! # Overview
//!
//! - **Transport**: non-blocking frame delivery plus an inbound queue
//! - **Dispatcher**: tag-keyed handler table with per-id entries and
//!   one-shot reply slots
//! - **Correlator**: per-tag ids, calls with timeouts, slot cleanup
//! - **Manager**: one endpoint per thread, receive loop and Ready handshake
//!
//! # Example
//!
//! ```rust,no_run
//! use xxdk_core::WorkerConfig;
//! use xxdk_protocol::Tag;
//! use xxdk_worker::{memory_pair, Reply, WorkerManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ((main_tx, main_rx), (worker_tx, worker_rx)) = memory_pair();
//!     let config = WorkerConfig::default();
//!
//!     // Worker side: register handlers, then report ready
//!     let worker = WorkerManager::new("worker", worker_tx, worker_rx, config.clone());
//!     worker.register_handler(Tag::new("Echo"), |data| async move { Reply::Ok(data) });
//!     worker.signal_ready()?;
//!
//!     // Main side: wait for the Worker, then call it
//!     let main = WorkerManager::new("main", main_tx, main_rx, config);
//!     main.wait_ready().await?;
//!     let echoed = main.call(Tag::new("Echo"), b"ping".to_vec()).await?;
//!     assert_eq!(echoed, b"ping");
//!
//!     Ok(())
//! }
//! ```

mod correlator;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod rt;
pub mod stats;
pub mod transport;


// Re-exports
pub use dispatcher::{handler, Dispatcher, Handler, HandlerFn, InlineFn, Reply, Route};
pub use error::{Result, WorkerError};
pub use manager::WorkerManager;
pub use stats::ManagerStats;
pub use transport::{
    inbound_channel, memory_pair, Inbound, InboundReceiver, InboundSender, MemoryEnd,
    MemoryTransport, QueueTransport, Transport,
};
