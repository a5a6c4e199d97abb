//! Reactive cells - the subscription contract the engine runs on.
//!
//! The reconciler never talks to a signal graph directly. It talks to
//! [`ReactiveCell`]: a value box with a current value and a subscribe
//! operation returning a [`Disposer`]. Three things satisfy the contract:
//!
//! - [`ValueCell`] - the engine-owned synthetic cell. The component resolver
//!   creates these to bridge deferred and streaming results into the
//!   signal-patch machinery.
//! - The spark-signals bridge ([`cell_from_signal`]) - adapts an application
//!   `Signal<T>` into a cell through one dedicated `effect`. The effect is
//!   the only tracked read; everything downstream of the cell is plain
//!   listener dispatch, so a patch never collects spurious dependencies.
//! - Anything an embedder implements itself.
//!
//! This module also holds the producer/consumer pairs the resolver bridges:
//! [`Deferred`] (a single value that settles later) and [`ValueStream`]
//! (zero or more values over time).

use std::cell::RefCell;
use std::rc::Rc;

use spark_signals::{Signal, effect};

use crate::types::{Disposer, RenderError};

// =============================================================================
// Cell Contract
// =============================================================================

/// A reactive value box: current value + subscribe.
///
/// The engine treats cells as opaque. A cell must not deliver overlapping
/// fires to one listener; beyond that, delivery scheduling is the cell's
/// business (immediate, microtask-deferred, timer-based).
pub trait ReactiveCell<T> {
    /// The value the cell currently holds.
    fn current(&self) -> T;

    /// Register a change listener. The listener is called with each new
    /// value, never with the value current at subscribe time.
    ///
    /// The returned disposer releases the listener; calling it is idempotent
    /// by construction (it is `FnOnce`).
    fn subscribe(&self, listener: Box<dyn FnMut(T)>) -> Disposer;
}

/// Shared handle to a cell.
pub type CellRef<T> = Rc<dyn ReactiveCell<T>>;

// =============================================================================
// ValueCell - engine-owned synthetic cell
// =============================================================================

struct ListenerEntry<T> {
    id: u64,
    /// `None` while the listener is taken out for a call (re-entrancy guard).
    func: Option<Box<dyn FnMut(T)>>,
}

struct ValueCellInner<T> {
    value: RefCell<T>,
    listeners: RefCell<Vec<ListenerEntry<T>>>,
    next_id: std::cell::Cell<u64>,
}

/// The synthetic cell the engine creates internally.
///
/// Single-threaded; listeners fire synchronously inside [`ValueCell::set`].
/// The notify loop takes each listener out of the registry while calling it,
/// so a listener may subscribe or dispose (even itself) mid-fire without
/// aliasing the interior `RefCell`.
pub struct ValueCell<T> {
    inner: Rc<ValueCellInner<T>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> ValueCell<T> {
    /// Create a cell seeded with `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ValueCellInner {
                value: RefCell::new(value),
                listeners: RefCell::new(Vec::new()),
                next_id: std::cell::Cell::new(0),
            }),
        }
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Replace the value and notify every listener registered before this
    /// call. Listeners added during the fire see only subsequent sets.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value.clone();

        // Snapshot ids first: listeners may be added/removed mid-loop.
        let ids: Vec<u64> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|entry| entry.id)
            .collect();

        for id in ids {
            let taken = {
                let mut listeners = self.inner.listeners.borrow_mut();
                listeners
                    .iter_mut()
                    .find(|entry| entry.id == id)
                    .and_then(|entry| entry.func.take())
            };
            if let Some(mut func) = taken {
                func(value.clone());
                // Put the listener back unless it disposed itself mid-call.
                let mut listeners = self.inner.listeners.borrow_mut();
                if let Some(entry) = listeners.iter_mut().find(|entry| entry.id == id) {
                    entry.func = Some(func);
                }
            }
        }
    }

    /// Number of live listeners (test/debug aid).
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl<T: Clone + 'static> ReactiveCell<T> for ValueCell<T> {
    fn current(&self) -> T {
        self.get()
    }

    fn subscribe(&self, listener: Box<dyn FnMut(T)>) -> Disposer {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.listeners.borrow_mut().push(ListenerEntry {
            id,
            func: Some(listener),
        });

        let inner = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners.borrow_mut().retain(|entry| entry.id != id);
            }
        })
    }
}

// =============================================================================
// spark-signals Bridge
// =============================================================================

/// A cell fed by one `effect` over a `Signal`. Stops the effect when the
/// last reference drops.
struct SignalBridge<T> {
    cell: ValueCell<T>,
    stop: RefCell<Option<Disposer>>,
}

impl<T: Clone + 'static> ReactiveCell<T> for SignalBridge<T> {
    fn current(&self) -> T {
        self.cell.get()
    }

    fn subscribe(&self, listener: Box<dyn FnMut(T)>) -> Disposer {
        self.cell.subscribe(listener)
    }
}

impl<T> Drop for SignalBridge<T> {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.borrow_mut().take() {
            stop();
        }
    }
}

/// Bridge a spark-signals `Signal` into the cell contract.
///
/// `map` turns the signal's value into the cell's value. One effect reads
/// the signal; each run sets the cell, which notifies listeners outside any
/// tracking scope. The effect stops when the returned cell is dropped.
///
/// # Example
///
/// ```ignore
/// use spark_signals::signal;
/// use spark_render::cell_from_signal;
///
/// let count = signal(0i64);
/// let cell = cell_from_signal(&count, |n| n.to_string());
/// assert_eq!(cell.current(), "0");
/// count.set(3); // listeners see "3"
/// ```
pub fn cell_from_signal<S, T>(
    source: &Signal<S>,
    map: impl Fn(S) -> T + 'static,
) -> CellRef<T>
where
    S: Clone + PartialEq + 'static,
    T: Clone + 'static,
{
    let cell = ValueCell::new(map(source.get()));

    let sig = source.clone();
    let cell_for_effect = cell.clone();
    let stop = effect(move || {
        // The signal read is the only tracked dependency; the set fans out
        // through plain listener dispatch.
        cell_for_effect.set(map(sig.get()));
    });

    Rc::new(SignalBridge {
        cell,
        stop: RefCell::new(Some(Box::new(stop))),
    })
}

// =============================================================================
// Deferred - a single value that settles later
// =============================================================================

enum DeferredState<T> {
    Pending {
        on_resolve: Option<Box<dyn FnOnce(T)>>,
        on_reject: Option<Box<dyn FnOnce(RenderError)>>,
    },
    Resolved(T),
    Rejected(RenderError),
}

/// Consumer half of a deferred single value.
///
/// A component returns this when its content is not immediately available;
/// the resolver attaches callbacks via [`Deferred::on_settle`]. Settling
/// before the consumer attaches delivers synchronously at attach time.
pub struct Deferred<T> {
    state: Rc<RefCell<DeferredState<T>>>,
}

/// Clones share the settle state; when several attach, the latest
/// `on_settle` wins.
impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

/// Producer half: settle the deferred exactly once. Later calls are no-ops
/// (there is no cancellation; a late settle simply reaches no listener).
pub struct DeferredHandle<T> {
    state: Rc<RefCell<DeferredState<T>>>,
}

impl<T> Clone for DeferredHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

/// Create a deferred value pair: consumer side and producer handle.
pub fn deferred<T: 'static>() -> (Deferred<T>, DeferredHandle<T>) {
    let state = Rc::new(RefCell::new(DeferredState::Pending {
        on_resolve: None,
        on_reject: None,
    }));
    (
        Deferred {
            state: state.clone(),
        },
        DeferredHandle { state },
    )
}

impl<T: Clone + 'static> DeferredHandle<T> {
    /// Resolve with the final value. First settle wins; the value is kept so
    /// later consumers (a boundary re-invoking its children) see it too.
    pub fn resolve(&self, value: T) {
        let callback = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                DeferredState::Pending { on_resolve, .. } => {
                    let cb = on_resolve.take();
                    *state = DeferredState::Resolved(value.clone());
                    cb
                }
                _ => return,
            }
        };
        if let Some(cb) = callback {
            cb(value);
        }
    }

    /// Reject with an error. First settle wins.
    pub fn reject(&self, error: RenderError) {
        let callback = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                DeferredState::Pending { on_reject, .. } => {
                    let cb = on_reject.take();
                    *state = DeferredState::Rejected(error.clone());
                    cb
                }
                _ => return,
            }
        };
        if let Some(cb) = callback {
            cb(error);
        }
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Attach settle callbacks. If the deferred already settled, the matching
    /// callback runs synchronously before this returns.
    pub fn on_settle(
        self,
        on_resolve: impl FnOnce(T) + 'static,
        on_reject: impl FnOnce(RenderError) + 'static,
    ) {
        enum Immediate<T> {
            Value(T),
            Error(RenderError),
        }

        // The borrow ends before any user callback runs.
        let immediate = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                DeferredState::Pending {
                    on_resolve: slot_resolve,
                    on_reject: slot_reject,
                } => {
                    *slot_resolve = Some(Box::new(on_resolve));
                    *slot_reject = Some(Box::new(on_reject));
                    return;
                }
                DeferredState::Resolved(value) => Immediate::Value(value.clone()),
                DeferredState::Rejected(error) => Immediate::Error(error.clone()),
            }
        };

        match immediate {
            Immediate::Value(v) => on_resolve(v),
            Immediate::Error(e) => on_reject(e),
        }
    }
}

// =============================================================================
// ValueStream - zero or more values over time
// =============================================================================

/// One event on a value stream.
pub enum StreamEvent<T> {
    /// A produced value (last-write-wins at the consumer).
    Value(T),
    /// The producer failed; no further events follow.
    Failed(RenderError),
    /// The producer finished normally; no further events follow.
    Finished,
}

struct StreamState<T> {
    listener: Option<Box<dyn FnMut(StreamEvent<T>)>>,
    /// Most recent value emitted before a listener attached. No buffering
    /// beyond this: last write wins.
    last: Option<T>,
    /// Terminal event seen before a listener attached.
    terminal: Option<StreamEvent<T>>,
    done: bool,
}

/// Consumer half of an asynchronous value sequence.
pub struct ValueStream<T> {
    state: Rc<RefCell<StreamState<T>>>,
}

/// Clones share the stream; when several listen, the latest listener wins.
impl<T> Clone for ValueStream<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

/// Producer half: emit values, then optionally fail or finish. After a
/// terminal event, further calls are ignored.
pub struct StreamHandle<T> {
    state: Rc<RefCell<StreamState<T>>>,
}

impl<T> Clone for StreamHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

/// Create a value stream pair: consumer side and producer handle.
pub fn value_stream<T: 'static>() -> (ValueStream<T>, StreamHandle<T>) {
    let state = Rc::new(RefCell::new(StreamState {
        listener: None,
        last: None,
        terminal: None,
        done: false,
    }));
    (
        ValueStream {
            state: state.clone(),
        },
        StreamHandle { state },
    )
}

impl<T: 'static> StreamHandle<T> {
    fn dispatch(&self, event: StreamEvent<T>) {
        // Take the listener out for the call so it may emit re-entrantly.
        let taken = {
            let mut state = self.state.borrow_mut();
            if state.done {
                return;
            }
            if matches!(event, StreamEvent::Failed(_) | StreamEvent::Finished) {
                state.done = true;
            }
            match state.listener.take() {
                Some(listener) => Some(listener),
                None => {
                    match event {
                        StreamEvent::Value(v) => state.last = Some(v),
                        terminal => state.terminal = Some(terminal),
                    }
                    return;
                }
            }
        };
        if let Some(mut listener) = taken {
            listener(event);
            let mut state = self.state.borrow_mut();
            if state.listener.is_none() {
                state.listener = Some(listener);
            }
        }
    }

    /// Emit the next value.
    pub fn emit(&self, value: T) {
        self.dispatch(StreamEvent::Value(value));
    }

    /// Terminate the stream with a failure.
    pub fn fail(&self, error: RenderError) {
        self.dispatch(StreamEvent::Failed(error));
    }

    /// Terminate the stream normally.
    pub fn finish(&self) {
        self.dispatch(StreamEvent::Finished);
    }
}

impl<T: 'static> ValueStream<T> {
    /// Attach the single consumer. A value emitted before attach is replayed
    /// first (last write wins), then any terminal event.
    pub fn listen(self, mut listener: impl FnMut(StreamEvent<T>) + 'static) {
        let (replay_value, replay_terminal) = {
            let mut state = self.state.borrow_mut();
            (state.last.take(), state.terminal.take())
        };
        if let Some(v) = replay_value {
            listener(StreamEvent::Value(v));
        }
        if let Some(terminal) = replay_terminal {
            listener(terminal);
            return;
        }
        let mut state = self.state.borrow_mut();
        if !state.done {
            state.listener = Some(Box::new(listener));
        }
    }
}
