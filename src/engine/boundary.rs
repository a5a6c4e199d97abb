//! Boundary state machines - error boundaries and suspense.
//!
//! Each boundary owns its re-render state directly: a control block owned by
//! the closures it hands out (the error channel, the tracker notify) so it
//! outlives the caller's mount handle, with the resulting cycles cut by a
//! disposer on the boundary's own rendered node at unmount. There is no
//! registry mapping boundary identity to callbacks; the control block *is*
//! the identity.
//!
//! Boundaries talk to their subtree through context bindings:
//!
//! - the **error channel**: descendants patching asynchronously report
//!   component failures here instead of unwinding a call stack that no
//!   longer exists;
//! - the **suspense tracker**: the resolver registers every deferred
//!   component mounted beneath a suspense boundary and reports settlement.
//!
//! The context keys for these bindings are identity constants (one per
//! process thread), not mutable state.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use crate::context::{ContextEnv, ContextKey};
use crate::node::{
    self, AbstractNode, ErrorFallbackFn, OnErrorFn, RetryFn, SuspenseFallbackFn,
};
use crate::strategy::RenderStrategy;
use crate::types::RenderError;

use super::{RenderedNode, Renderer};

// =============================================================================
// Internal context keys
// =============================================================================

thread_local! {
    static ERROR_CHANNEL_KEY: ContextKey = ContextKey::new("error-channel");
    static SUSPENSE_KEY: ContextKey = ContextKey::new("suspense-tracker");
    static FALLBACK_GUARD_KEY: ContextKey = ContextKey::new("fallback-guard");
}

fn error_channel_key() -> ContextKey {
    ERROR_CHANNEL_KEY.with(Clone::clone)
}

fn suspense_key() -> ContextKey {
    SUSPENSE_KEY.with(Clone::clone)
}

fn fallback_guard_key() -> ContextKey {
    FALLBACK_GUARD_KEY.with(Clone::clone)
}

/// Error sink a boundary installs for its subtree.
struct ErrorChannel(Rc<dyn Fn(RenderError)>);

/// Report `err` to the nearest enclosing error boundary reachable from
/// `ctx`. Returns `false` when no boundary is bound.
pub(crate) fn report_to_channel(ctx: &ContextEnv, err: RenderError) -> bool {
    match ctx.get::<ErrorChannel>(&error_channel_key()) {
        Some(channel) => {
            (channel.0)(err);
            true
        }
        None => false,
    }
}

/// Whether `ctx` is inside a suspense fallback (where deferred resolution is
/// rejected).
pub(crate) fn fallback_guard_active(ctx: &ContextEnv) -> bool {
    ctx.contains(&fallback_guard_key())
}

/// The suspense tracker bound nearest to `ctx`, if any.
pub(crate) fn suspense_tracker_from(ctx: &ContextEnv) -> Option<SuspenseTracker> {
    ctx.get::<SuspenseTracker>(&suspense_key())
        .map(|t| (*t).clone())
}

// =============================================================================
// Suspense tracker
// =============================================================================

struct TrackerInner {
    pending: RefCell<HashSet<u64>>,
    next_id: Cell<u64>,
    /// Armed by the boundary once its initial mount completed. Settles
    /// notify; registrations do not (a mid-mount registration is picked up
    /// by the boundary's own post-mount check).
    notify: RefCell<Option<Rc<dyn Fn()>>>,
}

/// Pending-deferred bookkeeping shared between a suspense boundary and the
/// resolver working beneath it.
#[derive(Clone)]
pub(crate) struct SuspenseTracker {
    inner: Rc<TrackerInner>,
}

impl SuspenseTracker {
    fn new() -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                pending: RefCell::new(HashSet::new()),
                next_id: Cell::new(0),
                notify: RefCell::new(None),
            }),
        }
    }

    /// Track one pending deferred value.
    pub(crate) fn register(&self) -> u64 {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.pending.borrow_mut().insert(id);
        id
    }

    /// One pending value settled (resolved or rejected).
    pub(crate) fn settle(&self, id: u64) {
        let removed = self.inner.pending.borrow_mut().remove(&id);
        if removed {
            let notify = self.inner.notify.borrow().clone();
            if let Some(notify) = notify {
                notify();
            }
        }
    }

    fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    fn arm(&self, notify: Rc<dyn Fn()>) {
        *self.inner.notify.borrow_mut() = Some(notify);
    }

    fn disarm(&self) {
        self.inner.notify.borrow_mut().take();
    }
}

// =============================================================================
// Error boundary
// =============================================================================

/// Error-boundary states. `Fallback` leaves only via retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryPhase {
    Rendering,
    Rendered,
    Fallback,
}

struct ErrorBoundaryCtl<S: RenderStrategy + 'static> {
    renderer: Renderer<S>,
    /// Back-reference for the retry closures handed to fallback content.
    me: Weak<Self>,
    slot: Rc<RenderedNode<S::Handle>>,
    marker: S::Handle,
    fallback: ErrorFallbackFn<S::Handle>,
    on_error: Option<OnErrorFn>,
    children: Vec<AbstractNode<S::Handle>>,
    /// Outer context plus this boundary's error channel. Cleared at unmount
    /// to cut the channel's strong reference back to this block.
    child_ctx: RefCell<Option<ContextEnv>>,
    outer_ctx: ContextEnv,
    phase: RefCell<BoundaryPhase>,
}

impl<S: RenderStrategy + 'static> ErrorBoundaryCtl<S> {
    fn handle_error(&self, err: RenderError) {
        if *self.phase.borrow() == BoundaryPhase::Fallback {
            return;
        }
        if let Some(on_error) = &self.on_error {
            on_error(&err);
        }
        *self.phase.borrow_mut() = BoundaryPhase::Fallback;

        let me = self.me.clone();
        let retry: RetryFn = Rc::new(move || {
            if let Some(ctl) = me.upgrade() {
                ctl.retry();
            }
        });
        let content = (self.fallback)(&err, retry);
        if let Err(err) =
            self.renderer
                .replace_slot_content(&self.slot, &self.marker, &self.outer_ctx, &content)
        {
            tracing::error!(error = %err, "error boundary fallback failed to mount");
        }
    }

    fn retry(&self) {
        if *self.phase.borrow() != BoundaryPhase::Fallback {
            return;
        }
        *self.phase.borrow_mut() = BoundaryPhase::Rendering;
        let Some(child_ctx) = self.child_ctx.borrow().clone() else {
            // Already unmounted.
            return;
        };
        match self.renderer.replace_slot_content(
            &self.slot,
            &self.marker,
            &child_ctx,
            &node::fragment(self.children.clone()),
        ) {
            Ok(()) => {
                // Unless a descendant reported mid-mount.
                if *self.phase.borrow() == BoundaryPhase::Rendering {
                    *self.phase.borrow_mut() = BoundaryPhase::Rendered;
                }
            }
            Err(err) => self.handle_error(err),
        }
    }
}

/// Mount an error boundary: marker, error channel for the subtree, children
/// (or fallback when they fail synchronously).
pub(crate) fn mount_error_boundary<S: RenderStrategy + 'static>(
    renderer: &Renderer<S>,
    rendered: &Rc<RenderedNode<S::Handle>>,
    fallback: ErrorFallbackFn<S::Handle>,
    on_error: Option<OnErrorFn>,
    children: Vec<AbstractNode<S::Handle>>,
    ctx: &ContextEnv,
    container: &S::Handle,
) -> Result<(), RenderError> {
    let marker = renderer.strategy().create_comment("error-boundary");
    renderer.strategy().append_child(container, &marker);
    *rendered.marker.borrow_mut() = Some(marker.clone());

    let ctl = Rc::new_cyclic(|weak: &Weak<ErrorBoundaryCtl<S>>| ErrorBoundaryCtl {
        renderer: renderer.clone(),
        me: weak.clone(),
        slot: rendered.clone(),
        marker,
        fallback,
        on_error,
        children,
        child_ctx: RefCell::new(None),
        outer_ctx: ctx.clone(),
        phase: RefCell::new(BoundaryPhase::Rendering),
    });

    // The channel owns the control block: descendants patching after the
    // caller dropped the mount handle still reach the boundary. The cycle
    // through `child_ctx` is cut at unmount.
    let channel_ctl = ctl.clone();
    let channel = ErrorChannel(Rc::new(move |err| channel_ctl.handle_error(err)));
    let child_ctx = ctx.with_value(error_channel_key(), channel);
    *ctl.child_ctx.borrow_mut() = Some(child_ctx.clone());
    match renderer.mount(&node::fragment(ctl.children.clone()), &child_ctx, container) {
        Ok(child) => {
            if *ctl.phase.borrow() == BoundaryPhase::Fallback {
                // A descendant reported through the channel mid-mount and
                // the fallback is already in place; discard the children.
                renderer.unmount(&child);
            } else {
                rendered.set_children(vec![child]);
                *ctl.phase.borrow_mut() = BoundaryPhase::Rendered;
            }
        }
        Err(err) => {
            // Slot is still empty; the generic error path mounts the
            // fallback behind the marker.
            ctl.handle_error(err);
        }
    }

    // The control block lives exactly as long as the boundary is mounted.
    let keep_alive = ctl;
    rendered.push_subscription(Box::new(move || {
        // Dropping the stored context releases the channel's strong
        // reference back to the control block.
        keep_alive.child_ctx.borrow_mut().take();
        drop(keep_alive);
    }));
    Ok(())
}

// =============================================================================
// Suspense
// =============================================================================

/// Suspense states: showing children, or showing fallback while deferred
/// values are pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensePhase {
    Rendering,
    Pending,
}

struct SuspenseCtl<S: RenderStrategy + 'static> {
    renderer: Renderer<S>,
    slot: Rc<RenderedNode<S::Handle>>,
    marker: S::Handle,
    fallback: SuspenseFallbackFn<S::Handle>,
    children: Vec<AbstractNode<S::Handle>>,
    /// Outer context plus this boundary's tracker.
    child_ctx: ContextEnv,
    /// Outer context plus the fallback guard (no tracker: a fallback must
    /// resolve synchronously).
    guard_ctx: ContextEnv,
    outer_ctx: ContextEnv,
    tracker: SuspenseTracker,
    phase: RefCell<SuspensePhase>,
    /// Re-entrancy guard: a transition can trigger settles/registrations
    /// whose notifications must wait for the post-transition check.
    transitioning: Cell<bool>,
}

impl<S: RenderStrategy + 'static> SuspenseCtl<S> {
    /// Drive the state machine until phase and pending set agree.
    fn sync(&self) {
        if self.transitioning.get() {
            return;
        }
        self.transitioning.set(true);
        loop {
            let phase = *self.phase.borrow();
            let pending = self.tracker.pending_count();
            match (phase, pending) {
                (SuspensePhase::Rendering, n) if n > 0 => {
                    if !self.show_fallback() {
                        break;
                    }
                }
                (SuspensePhase::Pending, 0) => {
                    if !self.show_children() {
                        break;
                    }
                }
                _ => break,
            }
        }
        self.transitioning.set(false);
    }

    /// Returns `false` when the transition could not complete.
    fn show_fallback(&self) -> bool {
        *self.phase.borrow_mut() = SuspensePhase::Pending;
        let content = (self.fallback)();
        match self
            .renderer
            .replace_slot_content(&self.slot, &self.marker, &self.guard_ctx, &content)
        {
            Ok(()) => true,
            Err(err) => {
                // Deferred fallbacks land here. Escalate to the nearest
                // error boundary; without one the slot is left empty.
                if !report_to_channel(&self.outer_ctx, err.clone()) {
                    tracing::error!(error = %err, "suspense fallback rejected");
                }
                false
            }
        }
    }

    /// Re-invoke the boundary's children. Returns `false` on failure.
    fn show_children(&self) -> bool {
        *self.phase.borrow_mut() = SuspensePhase::Rendering;
        match self.renderer.replace_slot_content(
            &self.slot,
            &self.marker,
            &self.child_ctx,
            &node::fragment(self.children.clone()),
        ) {
            Ok(()) => true,
            Err(err) => {
                if !report_to_channel(&self.outer_ctx, err.clone()) {
                    tracing::error!(error = %err, "suspense children failed on re-render");
                }
                false
            }
        }
    }
}

/// Mount a suspense boundary: marker, tracker for the subtree, children;
/// switches to the fallback when the mount left deferred values pending.
pub(crate) fn mount_suspense<S: RenderStrategy + 'static>(
    renderer: &Renderer<S>,
    rendered: &Rc<RenderedNode<S::Handle>>,
    fallback: SuspenseFallbackFn<S::Handle>,
    children: Vec<AbstractNode<S::Handle>>,
    ctx: &ContextEnv,
    container: &S::Handle,
) -> Result<(), RenderError> {
    let marker = renderer.strategy().create_comment("suspense");
    renderer.strategy().append_child(container, &marker);
    *rendered.marker.borrow_mut() = Some(marker.clone());

    let tracker = SuspenseTracker::new();
    let child_ctx = ctx.with_value(suspense_key(), tracker.clone());
    let guard_ctx = ctx.with_value(fallback_guard_key(), ());

    let ctl = Rc::new(SuspenseCtl {
        renderer: renderer.clone(),
        slot: rendered.clone(),
        marker: marker.clone(),
        fallback,
        children,
        child_ctx: child_ctx.clone(),
        guard_ctx,
        outer_ctx: ctx.clone(),
        tracker: tracker.clone(),
        phase: RefCell::new(SuspensePhase::Rendering),
        transitioning: Cell::new(false),
    });

    match renderer.mount(&node::fragment(ctl.children.clone()), &child_ctx, container) {
        Ok(child) => rendered.set_children(vec![child]),
        Err(err) => {
            renderer.strategy().remove_child(container, &marker);
            return Err(err);
        }
    }

    // The notify closure owns the control block: a deferred settling after
    // the caller dropped the mount handle still drives the transition. The
    // cycle through the tracker is cut by disarm at unmount.
    let notify_ctl = ctl.clone();
    tracker.arm(Rc::new(move || notify_ctl.sync()));

    // Initial mount may have left deferred values pending.
    ctl.sync();

    let keep_alive = ctl;
    rendered.push_subscription(Box::new(move || {
        keep_alive.tracker.disarm();
        drop(keep_alive);
    }));
    Ok(())
}
