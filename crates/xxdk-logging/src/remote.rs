//! Main-thread handle to the Worker's log file

use tracing::info;
use xxdk_core::{Result, XxdkError};
use xxdk_protocol::messages::{NewLogFileMessage, SizeReply};
use xxdk_protocol::{decode_payload, encode_payload, Envelope, Tag, SINGLETON_ID};
use xxdk_worker::WorkerManager;

/// Log file living in a Worker
#[derive(Clone)]
pub struct RemoteLogFile {
    manager: WorkerManager,
    name: String,
    max_size: usize,
}

impl RemoteLogFile {
    /// Wait for the Worker to become ready and create a log file of
    /// `max_size` bytes in it
    pub async fn new(manager: WorkerManager, name: &str, max_size: usize) -> Result<Self> {
        manager
            .wait_ready()
            .await
            .map_err(|e| XxdkError::Initialization(format!("log worker never became ready: {}", e)))?;

        let request = NewLogFileMessage {
            name: name.to_string(),
            max_size,
        };
        manager
            .call(Tag::NEW_LOG_FILE, encode_payload(&request)?)
            .await?;

        info!(name, max_size, endpoint = manager.name(), "Remote log file ready");
        Ok(Self {
            manager,
            name: name.to_string(),
            max_size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Append bytes to the log. Fire-and-forget.
    ///
    /// Goes straight to the transport so that a tracing writer built on this
    /// does not log its own sends.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let envelope = Envelope::request(Tag::WRITE_LOG, SINGLETON_ID, data.to_vec());
        self.manager.send(&envelope)?;
        Ok(())
    }

    /// Whole log contents, oldest byte first
    pub async fn get_file(&self) -> Result<Vec<u8>> {
        Ok(self.manager.call(Tag::GET_FILE, Vec::new()).await?)
    }

    /// Number of bytes currently held
    pub async fn size(&self) -> Result<usize> {
        let data = self.manager.call(Tag::SIZE, Vec::new()).await?;
        let reply: SizeReply = decode_payload(&data)?;
        Ok(reply.size)
    }

    pub fn manager(&self) -> &WorkerManager {
        &self.manager
    }
}
