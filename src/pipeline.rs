//! Typed, bidirectional handler pipeline driven by a channel's I/O loop.
//!
//! No direct teacher counterpart — `boomnet` dispatches by calling a single
//! `Endpoint` method per readiness event, not a handler chain. The shape
//! here (four ordered axes, type-filtered dispatch, copy-on-dispatch
//! mutation) is grounded on spec.md §4.3/§9's design notes; comment and
//! naming style follow `boomnet`'s terser idiom rather than the verbose
//! "spark" pipeline example in the retrieval pack.

use std::any::{Any, TypeId};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::buffer::DefaultChunkedBuffer;

/// A payload moving through a pipeline. Each handler either matches its
/// declared [`PayloadKind`] and (optionally) replaces the payload with a
/// higher-level message, or passes it through unchanged.
pub enum Payload {
    Bytes(DefaultChunkedBuffer),
    #[cfg(feature = "http")]
    HttpRequest(crate::http::HttpRequest),
    #[cfg(feature = "http")]
    HttpResponse(crate::http::HttpResponse),
    #[cfg(feature = "ws")]
    WebSocketFrame(crate::ws::Frame),
    /// Escape hatch for user-defined payload types, keyed at dispatch time
    /// by `TypeId` rather than by enum tag.
    User(Box<dyn Any + Send>),
}

/// The enum-of-kinds a [`HandlerEntry`] declares to filter dispatch against,
/// replacing the source's reflection-based handler type filtering.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PayloadKind {
    Bytes,
    #[cfg(feature = "http")]
    HttpRequest,
    #[cfg(feature = "http")]
    HttpResponse,
    #[cfg(feature = "ws")]
    WebSocketFrame,
    User(TypeId),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Bytes(_) => PayloadKind::Bytes,
            #[cfg(feature = "http")]
            Payload::HttpRequest(_) => PayloadKind::HttpRequest,
            #[cfg(feature = "http")]
            Payload::HttpResponse(_) => PayloadKind::HttpResponse,
            #[cfg(feature = "ws")]
            Payload::WebSocketFrame(_) => PayloadKind::WebSocketFrame,
            Payload::User(inner) => PayloadKind::User((**inner).type_id()),
        }
    }

    pub fn downcast_user<T: Any>(&self) -> Option<&T> {
        match self {
            Payload::User(inner) => inner.downcast_ref(),
            _ => None,
        }
    }

    pub fn downcast_user_mut<T: Any>(&mut self) -> Option<&mut T> {
        match self {
            Payload::User(inner) => inner.downcast_mut(),
            _ => None,
        }
    }
}

pub type HandlerId = u64;

fn next_handler_id() -> HandlerId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// A bundle of handler ids registered across a pipeline's axes by a single
/// `install()` call, matching spec.md §4.4's "Module: a bundle of handlers
/// + lifecycle hooks installed onto a channel". Protocol modules
/// (`http::install`, `ws::install`, `h2::install`, ...) build one of these
/// as they register their handlers and return it, so the module can later
/// be removed as a unit via [`Pipeline::remove_module`] rather than leaving
/// its `HandlerId`s to be tracked (or forgotten) by the caller.
#[derive(Default)]
pub struct ModuleHandle {
    incoming: Vec<HandlerId>,
    outgoing: Vec<HandlerId>,
    opened: Vec<HandlerId>,
    closed: Vec<HandlerId>,
}

impl ModuleHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_incoming(&mut self, id: HandlerId) {
        self.incoming.push(id);
    }

    pub fn push_outgoing(&mut self, id: HandlerId) {
        self.outgoing.push(id);
    }

    pub fn push_opened(&mut self, id: HandlerId) {
        self.opened.push(id);
    }

    pub fn push_closed(&mut self, id: HandlerId) {
        self.closed.push(id);
    }
}

struct PayloadHandlerEntry<C> {
    id: HandlerId,
    kind: PayloadKind,
    callback: Mutex<Box<dyn FnMut(&C, &mut Payload) + Send>>,
}

struct LifecycleHandlerEntry<C> {
    id: HandlerId,
    callback: Mutex<Box<dyn FnMut(&C) + Send>>,
}

/// One of the pipeline's four ordered handler chains.
struct Axis<Entry> {
    entries: Mutex<Vec<Arc<Entry>>>,
}

impl<Entry> Default for Axis<Entry> {
    fn default() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }
}

impl<Entry> Axis<Entry> {
    fn add_first(&self, entry: Entry) {
        self.entries.lock().expect("pipeline axis mutex poisoned").insert(0, Arc::new(entry));
    }

    fn add_last(&self, entry: Entry) {
        self.entries.lock().expect("pipeline axis mutex poisoned").push(Arc::new(entry));
    }

    fn remove(&self, id: HandlerId)
    where
        Entry: HasId,
    {
        self.entries.lock().expect("pipeline axis mutex poisoned").retain(|e| e.id() != id);
    }

    fn snapshot(&self) -> Vec<Arc<Entry>> {
        self.entries.lock().expect("pipeline axis mutex poisoned").clone()
    }
}

impl<Entry: HasId> Axis<Entry> {
    fn add_before(&self, reference: HandlerId, entry: Entry) {
        let mut entries = self.entries.lock().expect("pipeline axis mutex poisoned");
        let idx = entries.iter().position(|e| e.id() == reference).unwrap_or(entries.len());
        entries.insert(idx, Arc::new(entry));
    }

    fn add_after(&self, reference: HandlerId, entry: Entry) {
        let mut entries = self.entries.lock().expect("pipeline axis mutex poisoned");
        let idx = entries.iter().position(|e| e.id() == reference).map(|i| i + 1).unwrap_or(entries.len());
        entries.insert(idx, Arc::new(entry));
    }
}

trait HasId {
    fn id(&self) -> HandlerId;
}

impl<C> HasId for PayloadHandlerEntry<C> {
    fn id(&self) -> HandlerId {
        self.id
    }
}

impl<C> HasId for LifecycleHandlerEntry<C> {
    fn id(&self) -> HandlerId {
        self.id
    }
}

/// Per-channel ordered handler chains across the four axes described in
/// spec.md §4.3: incoming, outgoing, opened, closed.
///
/// `C` is the channel context type passed to handlers (typically
/// `&dyn ChannelContext` or a concrete channel handle); the pipeline itself
/// stays agnostic of what a channel actually is.
pub struct Pipeline<C> {
    incoming: Axis<PayloadHandlerEntry<C>>,
    outgoing: Axis<PayloadHandlerEntry<C>>,
    opened: Axis<LifecycleHandlerEntry<C>>,
    closed: Axis<LifecycleHandlerEntry<C>>,
}

impl<C> Default for Pipeline<C> {
    fn default() -> Self {
        Self {
            incoming: Axis::default(),
            outgoing: Axis::default(),
            opened: Axis::default(),
            closed: Axis::default(),
        }
    }
}

macro_rules! payload_axis_methods {
    ($add_first:ident, $add_last:ident, $add_before:ident, $add_after:ident, $remove:ident, $dispatch:ident, $axis:ident) => {
        /// Register `callback` at the front of this axis for payloads
        /// matching `kind`. Returns the handler's id, usable with
        /// `addBefore`/`addAfter`/`remove`.
        pub fn $add_first<F>(&self, kind: PayloadKind, callback: F) -> HandlerId
        where
            F: FnMut(&C, &mut Payload) + Send + 'static,
        {
            let id = next_handler_id();
            self.$axis.add_first(PayloadHandlerEntry { id, kind, callback: Mutex::new(Box::new(callback)) });
            id
        }

        pub fn $add_last<F>(&self, kind: PayloadKind, callback: F) -> HandlerId
        where
            F: FnMut(&C, &mut Payload) + Send + 'static,
        {
            let id = next_handler_id();
            self.$axis.add_last(PayloadHandlerEntry { id, kind, callback: Mutex::new(Box::new(callback)) });
            id
        }

        pub fn $add_before<F>(&self, reference: HandlerId, kind: PayloadKind, callback: F) -> HandlerId
        where
            F: FnMut(&C, &mut Payload) + Send + 'static,
        {
            let id = next_handler_id();
            self.$axis
                .add_before(reference, PayloadHandlerEntry { id, kind, callback: Mutex::new(Box::new(callback)) });
            id
        }

        pub fn $add_after<F>(&self, reference: HandlerId, kind: PayloadKind, callback: F) -> HandlerId
        where
            F: FnMut(&C, &mut Payload) + Send + 'static,
        {
            let id = next_handler_id();
            self.$axis
                .add_after(reference, PayloadHandlerEntry { id, kind, callback: Mutex::new(Box::new(callback)) });
            id
        }

        pub fn $remove(&self, id: HandlerId) {
            self.$axis.remove(id);
        }

        pub fn $dispatch(&self, ctx: &C, payload: &mut Payload) {
            for entry in self.$axis.snapshot() {
                if entry.kind != payload.kind() {
                    continue;
                }
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    let mut callback = entry.callback.lock().expect("handler mutex poisoned");
                    callback(ctx, payload);
                }));
                if outcome.is_err() {
                    log::error!("pipeline handler panicked; continuing dispatch to remaining handlers");
                }
            }
        }
    };
}

macro_rules! lifecycle_axis_methods {
    ($add_first:ident, $add_last:ident, $remove:ident, $dispatch:ident, $axis:ident) => {
        pub fn $add_first<F>(&self, callback: F) -> HandlerId
        where
            F: FnMut(&C) + Send + 'static,
        {
            let id = next_handler_id();
            self.$axis.add_first(LifecycleHandlerEntry { id, callback: Mutex::new(Box::new(callback)) });
            id
        }

        pub fn $add_last<F>(&self, callback: F) -> HandlerId
        where
            F: FnMut(&C) + Send + 'static,
        {
            let id = next_handler_id();
            self.$axis.add_last(LifecycleHandlerEntry { id, callback: Mutex::new(Box::new(callback)) });
            id
        }

        pub fn $remove(&self, id: HandlerId) {
            self.$axis.remove(id);
        }

        pub fn $dispatch(&self, ctx: &C) {
            for entry in self.$axis.snapshot() {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    let mut callback = entry.callback.lock().expect("handler mutex poisoned");
                    callback(ctx);
                }));
                if outcome.is_err() {
                    log::error!("pipeline handler panicked; continuing dispatch to remaining handlers");
                }
            }
        }
    };
}

impl<C> Pipeline<C> {
    /// Build a new pipeline whose axes start as a snapshot of `self`'s:
    /// handler entries (`Arc`s) are shared with `self`, but subsequent
    /// `add`/`remove` calls on the fork are independent. Used by
    /// `ListenerChannel` to give each accepted `RemoteChannel` its own
    /// pipeline seeded with the listener's handlers (spec.md §4.5).
    pub fn fork(&self) -> Pipeline<C> {
        Pipeline {
            incoming: Axis { entries: Mutex::new(self.incoming.snapshot()) },
            outgoing: Axis { entries: Mutex::new(self.outgoing.snapshot()) },
            opened: Axis { entries: Mutex::new(self.opened.snapshot()) },
            closed: Axis { entries: Mutex::new(self.closed.snapshot()) },
        }
    }

    payload_axis_methods!(
        add_incoming_first,
        add_incoming_last,
        add_incoming_before,
        add_incoming_after,
        remove_incoming,
        handle_incoming,
        incoming
    );

    payload_axis_methods!(
        add_outgoing_first,
        add_outgoing_last,
        add_outgoing_before,
        add_outgoing_after,
        remove_outgoing,
        handle_outgoing,
        outgoing
    );

    lifecycle_axis_methods!(add_opened_first, add_opened_last, remove_opened, handle_opened, opened);
    lifecycle_axis_methods!(add_closed_first, add_closed_last, remove_closed, handle_closed, closed);

    /// removeModule (spec.md §4.4): remove every handler `handle`'s
    /// `install()` call registered, across whichever axes it used.
    pub fn remove_module(&self, handle: ModuleHandle) {
        for id in handle.incoming {
            self.remove_incoming(id);
        }
        for id in handle.outgoing {
            self.remove_outgoing(id);
        }
        for id in handle.opened {
            self.remove_opened(id);
        }
        for id in handle.closed {
            self.remove_closed(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::DefaultBufferPool;
    use std::sync::atomic::AtomicBool;

    struct Ctx;

    #[test]
    fn dispatch_invokes_only_matching_kind() {
        let pipeline: Pipeline<Ctx> = Pipeline::default();
        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        pipeline.add_incoming_last(PayloadKind::Bytes, move |_ctx, _payload| {
            called2.store(true, Ordering::SeqCst);
        });

        let pool = DefaultBufferPool::default();
        let mut payload = Payload::Bytes(DefaultChunkedBuffer::new(pool));
        pipeline.handle_incoming(&Ctx, &mut payload);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn removed_handler_is_not_invoked() {
        let pipeline: Pipeline<Ctx> = Pipeline::default();
        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        let id = pipeline.add_incoming_last(PayloadKind::Bytes, move |_ctx, _payload| {
            called2.store(true, Ordering::SeqCst);
        });
        pipeline.remove_incoming(id);

        let pool = DefaultBufferPool::default();
        let mut payload = Payload::Bytes(DefaultChunkedBuffer::new(pool));
        pipeline.handle_incoming(&Ctx, &mut payload);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn add_before_and_after_preserve_relative_order() {
        let pipeline: Pipeline<Ctx> = Pipeline::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        let middle = pipeline.add_incoming_last(PayloadKind::Bytes, move |_, _| o1.lock().unwrap().push("middle"));
        let o2 = order.clone();
        pipeline.add_incoming_before(middle, PayloadKind::Bytes, move |_, _| o2.lock().unwrap().push("before"));
        let o3 = order.clone();
        pipeline.add_incoming_after(middle, PayloadKind::Bytes, move |_, _| o3.lock().unwrap().push("after"));

        let pool = DefaultBufferPool::default();
        let mut payload = Payload::Bytes(DefaultChunkedBuffer::new(pool));
        pipeline.handle_incoming(&Ctx, &mut payload);
        assert_eq!(*order.lock().unwrap(), vec!["before", "middle", "after"]);
    }

    #[test]
    fn fork_shares_existing_handlers_but_not_later_additions() {
        let pipeline: Pipeline<Ctx> = Pipeline::default();
        let shared_calls = Arc::new(AtomicBool::new(false));
        let shared_calls2 = shared_calls.clone();
        pipeline.add_incoming_last(PayloadKind::Bytes, move |_, _| {
            shared_calls2.store(true, Ordering::SeqCst);
        });

        let fork = pipeline.fork();
        let fork_only_calls = Arc::new(AtomicBool::new(false));
        let fork_only_calls2 = fork_only_calls.clone();
        fork.add_incoming_last(PayloadKind::Bytes, move |_, _| {
            fork_only_calls2.store(true, Ordering::SeqCst);
        });

        let pool = DefaultBufferPool::default();
        let mut payload = Payload::Bytes(DefaultChunkedBuffer::new(pool.clone()));
        pipeline.handle_incoming(&Ctx, &mut payload);
        assert!(shared_calls.load(Ordering::SeqCst));
        assert!(!fork_only_calls.load(Ordering::SeqCst), "handler added to the fork must not appear on the original");

        shared_calls.store(false, Ordering::SeqCst);
        let mut payload = Payload::Bytes(DefaultChunkedBuffer::new(pool));
        fork.handle_incoming(&Ctx, &mut payload);
        assert!(shared_calls.load(Ordering::SeqCst), "fork must still run handlers it was seeded with");
        assert!(fork_only_calls.load(Ordering::SeqCst));
    }

    #[test]
    fn a_panicking_handler_does_not_abort_dispatch_to_later_handlers() {
        let pipeline: Pipeline<Ctx> = Pipeline::default();
        pipeline.add_incoming_last(PayloadKind::Bytes, |_, _| panic!("boom"));
        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        pipeline.add_incoming_last(PayloadKind::Bytes, move |_, _| {
            called2.store(true, Ordering::SeqCst);
        });

        let pool = DefaultBufferPool::default();
        let mut payload = Payload::Bytes(DefaultChunkedBuffer::new(pool));
        pipeline.handle_incoming(&Ctx, &mut payload);
        assert!(called.load(Ordering::SeqCst));
    }
}
