//! Channel transport
//!
//! A transport moves encoded frames to the peer thread. Sending only
//! enqueues and never blocks; inbound frames (and the platform's
//! "messageerror" events) arrive on an [`InboundReceiver`] that the manager's
//! receive loop drains. The transport itself never times out.

use std::sync::Arc;

use tokio::sync::mpsc;
use xxdk_core::WireFormat;
use xxdk_protocol::{codec, Envelope, Frame};

use crate::error::{Result, WorkerError};
use crate::stats::Counters;

/// Something that arrived from the peer thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// An encoded envelope
    Frame(Frame),
    /// The platform could not deliver a message (e.g. it failed to deserialise)
    MessageError(String),
}

/// Receiving half of an endpoint's inbound queue
pub type InboundReceiver = mpsc::UnboundedReceiver<Inbound>;

/// Sending half of an endpoint's inbound queue, fed by the platform
pub type InboundSender = mpsc::UnboundedSender<Inbound>;

/// Create an empty inbound queue
pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}

/// Delivers frames to the peer thread
pub trait Transport: Send + Sync + 'static {
    /// Enqueue a frame for delivery. Fails only when the peer link is gone.
    fn send(&self, frame: Frame) -> Result<()>;
}

/// In-process transport that writes straight into the peer's inbound queue.
///
/// Used natively and in tests in place of `postMessage`.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    peer: InboundSender,
}

impl MemoryTransport {
    /// Simulate a "messageerror" event on the peer
    pub fn inject_message_error(&self, reason: impl Into<String>) -> Result<()> {
        self.peer
            .send(Inbound::MessageError(reason.into()))
            .map_err(|_| WorkerError::TransportClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.peer.is_closed()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, frame: Frame) -> Result<()> {
        self.peer
            .send(Inbound::Frame(frame))
            .map_err(|_| WorkerError::TransportClosed)
    }
}

/// One side of a [`memory_pair`]
pub type MemoryEnd = (MemoryTransport, InboundReceiver);

/// Two connected in-memory endpoints: frames sent on one arrive on the other
pub fn memory_pair() -> (MemoryEnd, MemoryEnd) {
    let (a_tx, a_rx) = inbound_channel();
    let (b_tx, b_rx) = inbound_channel();
    (
        (MemoryTransport { peer: b_tx }, a_rx),
        (MemoryTransport { peer: a_tx }, b_rx),
    )
}

/// Transport that queues frames for a platform pump to post.
///
/// The browser's `postMessage` handles are not `Send`, so they stay on a
/// local task that drains the queue returned by [`QueueTransport::new`].
#[derive(Debug, Clone)]
pub struct QueueTransport {
    tx: mpsc::UnboundedSender<Frame>,
}

impl QueueTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for QueueTransport {
    fn send(&self, frame: Frame) -> Result<()> {
        self.tx.send(frame).map_err(|_| WorkerError::TransportClosed)
    }
}

/// Encodes envelopes and hands them to the transport
#[derive(Clone)]
pub(crate) struct Outbound {
    transport: Arc<dyn Transport>,
    format: WireFormat,
    counters: Arc<Counters>,
}

impl Outbound {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        format: WireFormat,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            transport,
            format,
            counters,
        }
    }

    pub(crate) fn send(&self, envelope: &Envelope) -> Result<()> {
        let frame = codec::encode(envelope, self.format)
            .map_err(|e| WorkerError::Encode(e.to_string()))?;
        self.transport.send(frame)?;
        self.counters.record_sent();
        Ok(())
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_delivers_both_ways() {
        let ((a, mut a_rx), (b, mut b_rx)) = memory_pair();

        a.send(Frame::Text("to b".into())).unwrap();
        b.send(Frame::Binary(vec![1, 2])).unwrap();

        assert_eq!(b_rx.recv().await, Some(Inbound::Frame(Frame::Text("to b".into()))));
        assert_eq!(a_rx.recv().await, Some(Inbound::Frame(Frame::Binary(vec![1, 2]))));
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped_fails() {
        let ((a, _a_rx), (_b, b_rx)) = memory_pair();
        drop(b_rx);

        assert!(a.is_closed());
        assert_eq!(
            a.send(Frame::Text("lost".into())),
            Err(WorkerError::TransportClosed)
        );
    }

    #[tokio::test]
    async fn test_queue_transport() {
        let (transport, mut rx) = QueueTransport::new();
        transport.send(Frame::Text("x".into())).unwrap();
        assert_eq!(rx.recv().await, Some(Frame::Text("x".into())));
    }
}
