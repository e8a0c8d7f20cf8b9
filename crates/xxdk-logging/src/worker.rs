//! Worker-side log file
//!
//! Holds one [`CircularBuffer`] created by `NewLogFile`. `WriteLog` appends
//! without replying; `GetFile` returns the whole buffer and `Size` its
//! length. Every handler runs inline on the receive loop, so writes land in
//! the order they were sent and reads see every earlier write.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};
use xxdk_core::{Result, XxdkError};
use xxdk_protocol::messages::{NewLogFileMessage, SizeReply};
use xxdk_protocol::{decode_payload, encode_payload, Tag};
use xxdk_worker::{Reply, WorkerManager};

use crate::circular::CircularBuffer;

#[derive(Debug)]
struct LogFile {
    name: String,
    buffer: CircularBuffer,
}

type LogSlot = Arc<Mutex<Option<LogFile>>>;

fn not_created() -> XxdkError {
    XxdkError::Initialization("log file not created".into())
}

fn reply_bytes(result: Result<Vec<u8>>) -> Reply {
    match result {
        Ok(bytes) => Reply::Ok(bytes),
        Err(e) => Reply::Err(e.to_wire()),
    }
}

/// The log file handler set
pub struct LogFileWorker {
    manager: WorkerManager,
    file: LogSlot,
}

impl LogFileWorker {
    pub fn new(manager: WorkerManager) -> Self {
        Self {
            manager,
            file: Arc::new(Mutex::new(None)),
        }
    }

    pub fn manager(&self) -> &WorkerManager {
        &self.manager
    }

    /// Register every handler, then tell the main thread the Worker is ready
    pub fn start(&self) -> Result<()> {
        let file = self.file.clone();
        self.manager.register_inline_handler(Tag::NEW_LOG_FILE, move |data| {
            reply_bytes(decode_payload::<NewLogFileMessage>(&data).map(|msg| {
                info!(name = %msg.name, max_size = msg.max_size, "Created log file");
                *file.lock() = Some(LogFile {
                    name: msg.name,
                    buffer: CircularBuffer::new(msg.max_size),
                });
                Vec::new()
            }))
        });

        let file = self.file.clone();
        self.manager.register_inline_handler(Tag::WRITE_LOG, move |data| {
            match file.lock().as_mut() {
                Some(log) => log.buffer.write(&data),
                None => warn!(bytes = data.len(), "Dropping log write before NewLogFile"),
            }
            Reply::None
        });

        let file = self.file.clone();
        self.manager.register_inline_handler(Tag::GET_FILE, move |_| {
            let contents = file
                .lock()
                .as_ref()
                .map(|log| log.buffer.contents())
                .ok_or_else(not_created);
            reply_bytes(contents)
        });

        let file = self.file.clone();
        self.manager.register_inline_handler(Tag::SIZE, move |_| {
            let size = file
                .lock()
                .as_ref()
                .map(|log| SizeReply {
                    size: log.buffer.len(),
                })
                .ok_or_else(not_created);
            reply_bytes(size.and_then(|size| encode_payload(&size)))
        });

        info!(endpoint = self.manager.name(), "Log file worker handlers registered");
        self.manager.signal_ready()?;
        Ok(())
    }

    /// Name of the current log file, if one was created
    pub fn file_name(&self) -> Option<String> {
        self.file.lock().as_ref().map(|log| log.name.clone())
    }
}
