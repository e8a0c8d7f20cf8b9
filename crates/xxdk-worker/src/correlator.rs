//! Request/response correlation
//!
//! A call parks a one-shot slot in the dispatcher under a fresh `(tag, id)`,
//! sends the request and waits for the slot or the deadline, whichever comes
//! first. The slot is removed however the wait ends: delivery, timeout,
//! send failure or the caller dropping the future.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use xxdk_protocol::{Envelope, Kind, Tag};

use crate::dispatcher::Dispatcher;
use crate::error::{Result, WorkerError};
use crate::rt;
use crate::transport::Outbound;

/// Removes a pending slot unless the reply already claimed it
struct PendingGuard {
    dispatcher: Arc<Dispatcher>,
    tag: Tag,
    id: u64,
    armed: bool,
}

impl PendingGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.armed && self.dispatcher.remove_pending(&self.tag, self.id) {
            debug!(tag = %self.tag, id = self.id, "Removed pending call slot");
        }
    }
}

#[derive(Clone)]
pub(crate) struct Correlator {
    dispatcher: Arc<Dispatcher>,
    outbound: Outbound,
}

impl Correlator {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>, outbound: Outbound) -> Self {
        Self {
            dispatcher,
            outbound,
        }
    }

    /// Send a request and wait up to `timeout` for its response
    pub(crate) async fn call(&self, tag: Tag, data: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        let (id, slot) = self.dispatcher.register_pending(&tag);
        let guard = PendingGuard {
            dispatcher: self.dispatcher.clone(),
            tag: tag.clone(),
            id,
            armed: true,
        };

        debug!(%tag, id, bytes = data.len(), "Sending call");
        let started = rt::Instant::now();
        self.outbound.send(&Envelope::request(tag.clone(), id, data))?;

        match rt::timeout(timeout, slot).await {
            Some(Ok(envelope)) => {
                guard.disarm();
                match envelope.kind {
                    Kind::Error => Err(WorkerError::Remote {
                        tag,
                        message: String::from_utf8_lossy(&envelope.data).into_owned(),
                    }),
                    _ => Ok(envelope.data),
                }
            }
            Some(Err(_)) => Err(WorkerError::Cancelled { tag }),
            None => {
                self.outbound.counters().record_timeout();
                let elapsed = started.elapsed();
                warn!(%tag, id, timeout_ms = timeout.as_millis() as u64, elapsed_ms = elapsed.as_millis() as u64, "Call timed out");
                Err(WorkerError::Timeout { tag, elapsed })
            }
        }
    }

    /// Send a one-way request under the singleton id
    pub(crate) fn notify(&self, tag: Tag, data: Vec<u8>) -> Result<()> {
        debug!(%tag, bytes = data.len(), "Sending notification");
        self.outbound
            .send(&Envelope::request(tag, xxdk_protocol::SINGLETON_ID, data))
    }
}
