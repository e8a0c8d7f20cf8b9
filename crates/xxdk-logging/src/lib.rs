//! xxdk Logging - Circular log file kept in a Worker
//!
//! The Worker holds a fixed-size [`CircularBuffer`] that keeps the newest
//! bytes written to it. The main thread writes through a [`RemoteLogFile`],
//! usually wrapped in a [`LogFileWriter`] installed as a tracing writer.
//!
//! ## Example
//!
//! ```rust,no_run
//! use xxdk_core::WorkerConfig;
//! use xxdk_logging::{LogFileWorker, LogFileWriter, RemoteLogFile};
//! use xxdk_worker::{memory_pair, WorkerManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ((main_tx, main_rx), (worker_tx, worker_rx)) = memory_pair();
//!     let config = WorkerConfig::default();
//!
//!     let worker = WorkerManager::new("logging", worker_tx, worker_rx, config.clone());
//!     LogFileWorker::new(worker).start()?;
//!
//!     let main = WorkerManager::new("main", main_tx, main_rx, config);
//!     let file = RemoteLogFile::new(main, "client.log", 64 * 1024).await?;
//!
//!     tracing_subscriber::fmt()
//!         .with_ansi(false)
//!         .with_writer(LogFileWriter::new(file.clone()))
//!         .init();
//!
//!     tracing::info!("hello");
//!     println!("{}", String::from_utf8_lossy(&file.get_file().await?));
//!     Ok(())
//! }
//! ```

pub mod circular;
pub mod remote;
pub mod worker;
pub mod writer;

pub use circular::CircularBuffer;
pub use remote::RemoteLogFile;
pub use worker::LogFileWorker;
pub use writer::LogFileWriter;
