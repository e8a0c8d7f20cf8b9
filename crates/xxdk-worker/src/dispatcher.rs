//! Handler registry and envelope routing
//!
//! Each tag owns an optional singleton handler and a table of per-id
//! entries. An entry is either a persistent handler for one `(tag, id)` or a
//! one-shot slot a caller is waiting on. Requests go to the `(tag, id)`
//! handler and fall back to the singleton; replies and errors only ever go to
//! the slot registered for the same `(tag, id)`.
//!
//! Handlers are either spawned per request or run inline on the receive
//! loop. Inline handlers see their requests in arrival order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;
use xxdk_protocol::{Envelope, Tag};

/// What a handler wants sent back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing; the request was a notification
    None,
    /// A reply envelope carrying these bytes
    Ok(Vec<u8>),
    /// An error envelope carrying this message
    Err(String),
}

impl Reply {
    /// Reply with the payload or the error's display text
    pub fn from_result<E: std::fmt::Display>(result: Result<Vec<u8>, E>) -> Self {
        match result {
            Ok(data) => Reply::Ok(data),
            Err(e) => Reply::Err(e.to_string()),
        }
    }
}

/// A request handler: takes the envelope payload, yields the reply
pub type HandlerFn = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Reply> + Send + Sync>;

/// Box an async closure into a [`HandlerFn`]
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    Arc::new(move |data| Box::pin(f(data)))
}

/// A synchronous handler run on the receive loop before the next envelope
pub type InlineFn = Arc<dyn Fn(Vec<u8>) -> Reply + Send + Sync>;

/// A registered handler and how the receive loop runs it
#[derive(Clone)]
pub enum Handler {
    /// Spawned as its own task; may finish out of arrival order
    Spawned(HandlerFn),
    /// Run to completion before the next envelope is routed
    Inline(InlineFn),
}

enum Entry {
    Handler(Handler),
    Pending(oneshot::Sender<Envelope>),
}

#[derive(Default)]
struct TagTable {
    singleton: Option<Handler>,
    entries: HashMap<u64, Entry>,
    next_id: u64,
}

impl TagTable {
    fn allocate(&mut self) -> u64 {
        let mut id = self.next_id;
        while self.entries.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        self.next_id = id.wrapping_add(1);
        id
    }
}

/// Where an inbound envelope ended up
pub enum Route {
    /// A request with a handler to run
    Handle(Handler, Envelope),
    /// A response handed to its waiting caller
    Delivered,
    /// A request with no handler
    NoHandler(Envelope),
    /// A response with nobody waiting (late, unknown or duplicate)
    Orphaned(Envelope),
}

/// Tag-keyed handler table, one per manager
#[derive(Default)]
pub struct Dispatcher {
    tables: Mutex<HashMap<Tag, TagTable>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the singleton handler for `tag`, replacing any previous one
    pub fn register(&self, tag: Tag, handler: HandlerFn) {
        debug!(%tag, "Registering singleton handler");
        self.tables.lock().entry(tag).or_default().singleton = Some(Handler::Spawned(handler));
    }

    /// Register an inline singleton for `tag`, replacing any previous one
    pub fn register_inline(&self, tag: Tag, handler: InlineFn) {
        debug!(%tag, "Registering inline singleton handler");
        self.tables.lock().entry(tag).or_default().singleton = Some(Handler::Inline(handler));
    }

    /// Register a handler for one `(tag, id)`, replacing whatever was there
    pub fn register_with_id(&self, tag: Tag, id: u64, handler: HandlerFn) {
        debug!(%tag, id, "Registering handler");
        self.tables
            .lock()
            .entry(tag)
            .or_default()
            .entries
            .insert(id, Entry::Handler(Handler::Spawned(handler)));
    }

    /// Allocate the next correlation id for `tag`.
    ///
    /// Ids start at 0 and increase per tag, skipping any still occupied.
    pub fn next_id(&self, tag: &Tag) -> u64 {
        self.tables.lock().entry(tag.clone()).or_default().allocate()
    }

    /// Allocate an id for `tag` and park a one-shot slot under it
    pub fn register_pending(&self, tag: &Tag) -> (u64, oneshot::Receiver<Envelope>) {
        let mut tables = self.tables.lock();
        let table = tables.entry(tag.clone()).or_default();
        let id = table.allocate();

        let (tx, rx) = oneshot::channel();
        table.entries.insert(id, Entry::Pending(tx));
        (id, rx)
    }

    /// Drop the slot at `(tag, id)` if it is still waiting
    pub fn remove_pending(&self, tag: &Tag, id: u64) -> bool {
        let mut tables = self.tables.lock();
        let Some(table) = tables.get_mut(tag) else {
            return false;
        };
        match table.entries.get(&id) {
            Some(Entry::Pending(_)) => table.entries.remove(&id).is_some(),
            _ => false,
        }
    }

    /// Remove whatever is registered at `(tag, id)`
    pub fn unregister(&self, tag: &Tag, id: u64) -> bool {
        self.tables
            .lock()
            .get_mut(tag)
            .map(|table| table.entries.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub fn unregister_singleton(&self, tag: &Tag) -> bool {
        self.tables
            .lock()
            .get_mut(tag)
            .map(|table| table.singleton.take().is_some())
            .unwrap_or(false)
    }

    /// True when a handler or slot occupies `(tag, id)`
    pub fn contains(&self, tag: &Tag, id: u64) -> bool {
        self.tables
            .lock()
            .get(tag)
            .map(|table| table.entries.contains_key(&id))
            .unwrap_or(false)
    }

    pub fn has_singleton(&self, tag: &Tag) -> bool {
        self.tables
            .lock()
            .get(tag)
            .map(|table| table.singleton.is_some())
            .unwrap_or(false)
    }

    /// Number of callers still waiting on a reply
    pub fn pending_count(&self) -> usize {
        self.tables
            .lock()
            .values()
            .flat_map(|table| table.entries.values())
            .filter(|entry| matches!(entry, Entry::Pending(_)))
            .count()
    }

    /// Route an inbound envelope
    pub fn dispatch(&self, envelope: Envelope) -> Route {
        if envelope.is_response() {
            return self.deliver(envelope);
        }

        let tables = self.tables.lock();
        let handler = tables.get(&envelope.tag).and_then(|table| {
            match table.entries.get(&envelope.id) {
                Some(Entry::Handler(handler)) => Some(handler.clone()),
                _ => table.singleton.clone(),
            }
        });
        drop(tables);

        match handler {
            Some(handler) => Route::Handle(handler, envelope),
            None => Route::NoHandler(envelope),
        }
    }

    fn deliver(&self, envelope: Envelope) -> Route {
        let slot = {
            let mut tables = self.tables.lock();
            let Some(table) = tables.get_mut(&envelope.tag) else {
                return Route::Orphaned(envelope);
            };
            match table.entries.remove(&envelope.id) {
                Some(Entry::Pending(tx)) => tx,
                Some(handler @ Entry::Handler(_)) => {
                    table.entries.insert(envelope.id, handler);
                    return Route::Orphaned(envelope);
                }
                None => return Route::Orphaned(envelope),
            }
        };

        // The receiver is gone when the caller was dropped between the
        // lookup and the send.
        match slot.send(envelope) {
            Ok(()) => Route::Delivered,
            Err(envelope) => Route::Orphaned(envelope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> HandlerFn {
        handler(|data| async move { Reply::Ok(data) })
    }

    fn constant(byte: u8) -> HandlerFn {
        handler(move |_| async move { Reply::Ok(vec![byte]) })
    }

    async fn run(route: Route) -> Option<Reply> {
        match route {
            Route::Handle(Handler::Spawned(handler), envelope) => Some(handler(envelope.data).await),
            Route::Handle(Handler::Inline(handler), envelope) => Some(handler(envelope.data)),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_request_falls_back_to_singleton() {
        let dispatcher = Dispatcher::new();
        dispatcher.register(Tag::new("Echo"), echo());

        let route = dispatcher.dispatch(Envelope::request(Tag::new("Echo"), 42, b"hi".to_vec()));
        assert_eq!(run(route).await, Some(Reply::Ok(b"hi".to_vec())));
    }

    #[tokio::test]
    async fn test_id_handler_takes_precedence() {
        let dispatcher = Dispatcher::new();
        let tag = Tag::new("Pick");
        dispatcher.register(tag.clone(), constant(0));
        dispatcher.register_with_id(tag.clone(), 7, constant(7));

        let at_7 = dispatcher.dispatch(Envelope::request(tag.clone(), 7, vec![]));
        let at_8 = dispatcher.dispatch(Envelope::request(tag.clone(), 8, vec![]));
        assert_eq!(run(at_7).await, Some(Reply::Ok(vec![7])));
        assert_eq!(run(at_8).await, Some(Reply::Ok(vec![0])));

        assert!(dispatcher.unregister(&tag, 7));
        let at_7 = dispatcher.dispatch(Envelope::request(tag, 7, vec![]));
        assert_eq!(run(at_7).await, Some(Reply::Ok(vec![0])));
    }

    #[test]
    fn test_unknown_tag_has_no_handler() {
        let dispatcher = Dispatcher::new();
        let route = dispatcher.dispatch(Envelope::request(Tag::new("Nope"), 0, vec![]));
        assert!(matches!(route, Route::NoHandler(_)));
    }

    #[test]
    fn test_ids_increase_per_tag() {
        let dispatcher = Dispatcher::new();
        let a = Tag::new("A");
        let b = Tag::new("B");

        let (a0, _r0) = dispatcher.register_pending(&a);
        let (a1, _r1) = dispatcher.register_pending(&a);
        let (b0, _r2) = dispatcher.register_pending(&b);
        assert_eq!((a0, a1, b0), (0, 1, 0));
        assert_eq!(dispatcher.pending_count(), 3);
    }

    #[test]
    fn test_ids_skip_occupied_entries() {
        let dispatcher = Dispatcher::new();
        let tag = Tag::new("A");
        dispatcher.register_with_id(tag.clone(), 0, echo());
        dispatcher.register_with_id(tag.clone(), 1, echo());

        let (id, _rx) = dispatcher.register_pending(&tag);
        assert_eq!(id, 2);
    }

    #[tokio::test]
    async fn test_reply_goes_to_slot_only_once() {
        let dispatcher = Dispatcher::new();
        let tag = Tag::new("Call");
        dispatcher.register(tag.clone(), echo());
        let (id, rx) = dispatcher.register_pending(&tag);

        let reply = Envelope::reply(tag.clone(), id, b"done".to_vec());
        assert!(matches!(dispatcher.dispatch(reply.clone()), Route::Delivered));
        assert_eq!(rx.await.unwrap(), reply);

        // A duplicate reply finds no slot and never reaches the singleton.
        assert!(matches!(dispatcher.dispatch(reply), Route::Orphaned(_)));
        assert!(!dispatcher.contains(&tag, id));
    }

    #[test]
    fn test_reply_after_removal_is_orphaned() {
        let dispatcher = Dispatcher::new();
        let tag = Tag::new("Slow");
        let (id, _rx) = dispatcher.register_pending(&tag);

        assert!(dispatcher.remove_pending(&tag, id));
        assert!(!dispatcher.remove_pending(&tag, id));

        let late = Envelope::reply(tag, id, vec![]);
        assert!(matches!(dispatcher.dispatch(late), Route::Orphaned(_)));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_reply_to_handler_entry_leaves_it_in_place() {
        let dispatcher = Dispatcher::new();
        let tag = Tag::new("Mixed");
        dispatcher.register_with_id(tag.clone(), 3, echo());

        let stray = Envelope::error(tag.clone(), 3, "oops");
        assert!(matches!(dispatcher.dispatch(stray), Route::Orphaned(_)));
        assert!(dispatcher.contains(&tag, 3));
    }

    #[test]
    fn test_unregister_singleton() {
        let dispatcher = Dispatcher::new();
        let tag = Tag::new("Once");
        dispatcher.register(tag.clone(), echo());
        assert!(dispatcher.has_singleton(&tag));
        assert!(dispatcher.unregister_singleton(&tag));
        assert!(!dispatcher.has_singleton(&tag));
    }

    #[tokio::test]
    async fn test_inline_singleton_routes_as_inline() {
        let dispatcher = Dispatcher::new();
        let tag = Tag::new("Append");
        dispatcher.register_inline(tag.clone(), Arc::new(|data| Reply::Ok(data)));

        let route = dispatcher.dispatch(Envelope::request(tag.clone(), 9, b"x".to_vec()));
        assert!(matches!(route, Route::Handle(Handler::Inline(_), _)));
        assert_eq!(run(route).await, Some(Reply::Ok(b"x".to_vec())));

        // A per-id handler still takes precedence over the inline singleton.
        dispatcher.register_with_id(tag.clone(), 9, constant(1));
        let route = dispatcher.dispatch(Envelope::request(tag, 9, vec![]));
        assert!(matches!(route, Route::Handle(Handler::Spawned(_), _)));
        assert_eq!(run(route).await, Some(Reply::Ok(vec![1])));
    }

    #[test]
    fn test_reply_from_result() {
        let ok: Result<Vec<u8>, String> = Ok(vec![1]);
        let err: Result<Vec<u8>, String> = Err("bad".into());
        assert_eq!(Reply::from_result(ok), Reply::Ok(vec![1]));
        assert_eq!(Reply::from_result(err), Reply::Err("bad".into()));
    }
}
