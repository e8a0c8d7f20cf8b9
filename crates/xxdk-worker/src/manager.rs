//! Worker manager
//!
//! One manager runs on each side of the thread boundary. It owns the
//! transport, the handler registry and the correlator, runs the receive loop
//! and implements the Ready handshake: the Worker side calls
//! [`WorkerManager::signal_ready`] once all of its handlers are registered,
//! and the main side waits on [`WorkerManager::wait_ready`] before sending
//! application requests.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use xxdk_core::WorkerConfig;
use xxdk_protocol::{codec, Envelope, Tag};

use crate::correlator::Correlator;
use crate::dispatcher::{handler, Dispatcher, Handler, HandlerFn, Reply, Route};
use crate::error::{Result, WorkerError};
use crate::rt;
use crate::stats::{Counters, ManagerStats};
use crate::transport::{Inbound, InboundReceiver, Outbound, Transport};

struct Inner {
    name: Arc<str>,
    config: WorkerConfig,
    dispatcher: Arc<Dispatcher>,
    correlator: Correlator,
    outbound: Outbound,
    counters: Arc<Counters>,
    ready_sent: AtomicBool,
    ready_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
}

/// One endpoint of a main-thread / Worker channel.
///
/// Cheap to clone; all clones share the same registry and receive loop. The
/// loop stops on [`WorkerManager::shutdown`], when the last clone is
/// dropped, or when the peer closes the inbound queue.
#[derive(Clone)]
pub struct WorkerManager {
    inner: Arc<Inner>,
}

impl WorkerManager {
    /// Create a manager and start its receive loop.
    ///
    /// Natively this must be called from within a Tokio runtime.
    pub fn new(
        name: impl Into<String>,
        transport: impl Transport,
        inbound: InboundReceiver,
        config: WorkerConfig,
    ) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let counters = Arc::new(Counters::default());
        let dispatcher = Arc::new(Dispatcher::new());
        let outbound = Outbound::new(Arc::new(transport), config.wire_format, counters.clone());
        let correlator = Correlator::new(dispatcher.clone(), outbound.clone());

        let (ready_tx, ready_rx) = watch::channel(false);
        let ready_tx = Arc::new(ready_tx);
        dispatcher.register(
            Tag::READY,
            handler(move |_| {
                let ready_tx = ready_tx.clone();
                async move {
                    ready_tx.send_replace(true);
                    Reply::None
                }
            }),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(endpoint = %name, format = ?config.wire_format, "Starting worker manager");
        rt::spawn(receive_loop(
            name.clone(),
            dispatcher.clone(),
            outbound.clone(),
            inbound,
            shutdown_rx,
        ));

        Self {
            inner: Arc::new(Inner {
                name,
                config,
                dispatcher,
                correlator,
                outbound,
                counters,
                ready_sent: AtomicBool::new(false),
                ready_rx,
                shutdown_tx,
            }),
        }
    }

    /// Name used in log output
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Register the singleton handler for `tag`
    pub fn register_handler<F, Fut>(&self, tag: Tag, f: F)
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        self.inner.dispatcher.register(tag, handler(f));
    }

    /// Register a handler for a single `(tag, id)`
    pub fn register_handler_with_id<F, Fut>(&self, tag: Tag, id: u64, f: F)
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        self.inner.dispatcher.register_with_id(tag, id, handler(f));
    }

    /// Register a synchronous singleton for `tag` that runs on the receive
    /// loop. Requests reach it in the order the peer sent them.
    pub fn register_inline_handler<F>(&self, tag: Tag, f: F)
    where
        F: Fn(Vec<u8>) -> Reply + Send + Sync + 'static,
    {
        self.inner.dispatcher.register_inline(tag, Arc::new(f));
    }

    /// Register an already boxed handler as the singleton for `tag`
    pub fn register_boxed(&self, tag: Tag, handler: HandlerFn) {
        self.inner.dispatcher.register(tag, handler);
    }

    pub fn unregister_handler(&self, tag: &Tag) -> bool {
        self.inner.dispatcher.unregister_singleton(tag)
    }

    /// Call the peer and wait for its reply using the configured timeout
    pub async fn call(&self, tag: Tag, data: Vec<u8>) -> Result<Vec<u8>> {
        self.call_with_timeout(tag, data, self.inner.config.response_timeout())
            .await
    }

    /// Call the peer and wait up to `timeout` for its reply
    pub async fn call_with_timeout(
        &self,
        tag: Tag,
        data: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.inner.correlator.call(tag, data, timeout).await
    }

    /// Send a request that expects no reply
    pub fn notify(&self, tag: Tag, data: Vec<u8>) -> Result<()> {
        self.inner.correlator.notify(tag, data)
    }

    /// Send a raw envelope
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        self.inner.outbound.send(envelope)
    }

    /// Tell the peer every handler is registered. Only the first call sends.
    pub fn signal_ready(&self) -> Result<()> {
        if self.inner.ready_sent.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyReady);
        }
        info!(endpoint = %self.inner.name, "Signalling ready");
        self.inner.outbound.send(&Envelope::ready())
    }

    /// True once the peer's Ready signal has arrived
    pub fn is_ready(&self) -> bool {
        *self.inner.ready_rx.borrow()
    }

    /// Wait for the peer's Ready signal using the configured start-up timeout
    pub async fn wait_ready(&self) -> Result<()> {
        self.wait_ready_timeout(self.inner.config.initial_connection_timeout())
            .await
    }

    pub async fn wait_ready_timeout(&self, timeout: Duration) -> Result<()> {
        let started = rt::Instant::now();
        let ready = ready_flag(self.inner.ready_rx.clone());
        match rt::timeout(timeout, ready).await {
            Some(result) => result,
            None => {
                let elapsed = started.elapsed();
                warn!(endpoint = %self.inner.name, timeout_ms = timeout.as_millis() as u64, elapsed_ms = elapsed.as_millis() as u64, "Peer never became ready");
                Err(WorkerError::Timeout {
                    tag: Tag::READY,
                    elapsed,
                })
            }
        }
    }

    /// Snapshot of traffic counters
    pub fn stats(&self) -> ManagerStats {
        self.inner.counters.snapshot()
    }

    /// Calls still waiting for a reply
    pub fn pending_calls(&self) -> usize {
        self.inner.dispatcher.pending_count()
    }

    /// Access the handler registry directly
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Stop the receive loop. Pending calls run into their timeouts.
    pub fn shutdown(&self) {
        info!(endpoint = %self.inner.name, "Shutdown requested");
        self.inner.shutdown_tx.send_replace(true);
    }
}

async fn ready_flag(mut rx: watch::Receiver<bool>) -> Result<()> {
    loop {
        if *rx.borrow_and_update() {
            return Ok(());
        }
        rx.changed()
            .await
            .map_err(|_| WorkerError::TransportClosed)?;
    }
}

async fn receive_loop(
    endpoint: Arc<str>,
    dispatcher: Arc<Dispatcher>,
    outbound: Outbound,
    mut inbound: InboundReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            item = inbound.recv() => match item {
                Some(item) => handle_inbound(&endpoint, &dispatcher, &outbound, item),
                None => {
                    debug!(%endpoint, "Inbound queue closed");
                    break;
                }
            },
            // Fires on shutdown and when the manager is dropped.
            _ = shutdown.changed() => break,
        }
    }
    info!(%endpoint, "Receive loop stopped");
}

fn handle_inbound(endpoint: &str, dispatcher: &Dispatcher, outbound: &Outbound, item: Inbound) {
    let counters = outbound.counters();
    let frame = match item {
        Inbound::Frame(frame) => frame,
        Inbound::MessageError(reason) => {
            counters.record_message_error();
            warn!(%endpoint, %reason, "Peer failed to deliver a message");
            return;
        }
    };

    counters.record_received();
    let envelope = match codec::decode(&frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            counters.record_malformed();
            warn!(%endpoint, bytes = frame.len(), error = %e, "Dropping malformed frame");
            return;
        }
    };
    debug!(%endpoint, tag = %envelope.tag, id = envelope.id, kind = ?envelope.kind, "Received envelope");

    match dispatcher.dispatch(envelope) {
        Route::Handle(Handler::Inline(handler), envelope) => {
            counters.record_handled();
            let Envelope { tag, id, data, .. } = envelope;
            let reply = handler(data);
            send_reply(endpoint, outbound, tag, id, reply);
        }
        Route::Handle(Handler::Spawned(handler), envelope) => {
            counters.record_handled();
            let outbound = outbound.clone();
            let endpoint = endpoint.to_owned();
            rt::spawn(async move {
                let Envelope { tag, id, data, .. } = envelope;
                let reply = handler(data).await;
                send_reply(&endpoint, &outbound, tag, id, reply);
            });
        }
        Route::Delivered => counters.record_reply_delivered(),
        Route::NoHandler(envelope) => {
            counters.record_unhandled();
            let err = WorkerError::NoHandler {
                tag: envelope.tag,
                id: envelope.id,
            };
            warn!(%endpoint, error = %err, "Dropping request");
        }
        Route::Orphaned(envelope) => {
            counters.record_unhandled();
            warn!(%endpoint, tag = %envelope.tag, id = envelope.id, kind = ?envelope.kind, "No caller waiting; dropping response");
        }
    }
}

fn send_reply(endpoint: &str, outbound: &Outbound, tag: Tag, id: u64, reply: Reply) {
    let response = match reply {
        Reply::None => return,
        Reply::Ok(data) => Envelope::reply(tag, id, data),
        Reply::Err(message) => {
            debug!(%endpoint, %tag, id, %message, "Handler returned an error");
            Envelope::error(tag, id, &message)
        }
    };
    if let Err(e) = outbound.send(&response) {
        error!(%endpoint, tag = %response.tag, id = response.id, error = %e, "Failed to send response");
    }
}
