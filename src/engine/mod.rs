//! Reconciler - mount, patch, unmount.
//!
//! The engine walks an abstract node tree and builds a mirrored
//! [`RenderedNode`] tree holding output-node handles and subscription
//! disposers. After mount, nothing re-walks the tree: only a signal slot's
//! own cell subscription triggers work, and that work touches exactly the
//! slot's most recent mounted value.
//!
//! # Markers
//!
//! Every signal slot (and boundary) plants one permanent invisible marker
//! node at its position. The marker is the anchor for every later patch: old
//! content is removed, new content is inserted immediately after the marker,
//! node by node, so order stays deterministic even when the old or new
//! content occupies zero output nodes.
//!
//! # Teardown
//!
//! Unmount is the single teardown path: it releases every subscription
//! depth-first, then removes output nodes (including markers and portal
//! content living in other containers). Every disposer runs exactly once.

mod boundary;
mod resolver;

pub use boundary::{BoundaryPhase, SuspensePhase};
pub use resolver::resolve_component;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::context::ContextEnv;
use crate::node::{AbstractNode, PropEntry, RenderValue};
use crate::strategy::RenderStrategy;
use crate::types::{Disposer, PropLiteral, RenderError};

// =============================================================================
// Rendered Node
// =============================================================================

/// Live mount record for one abstract node.
///
/// Mutable where the patch path needs it: `children` is replaced in place so
/// the `Rc` identity of a signal slot survives its own patches and a
/// parent's child list stays stable.
pub struct RenderedNode<H: Clone + 'static> {
    source: AbstractNode<H>,
    handle: RefCell<Option<H>>,
    marker: RefCell<Option<H>>,
    subscriptions: RefCell<Vec<Disposer>>,
    children: RefCell<Vec<Rc<RenderedNode<H>>>>,
}

impl<H: Clone + 'static> RenderedNode<H> {
    fn new(source: AbstractNode<H>) -> Rc<Self> {
        Rc::new(Self {
            source,
            handle: RefCell::new(None),
            marker: RefCell::new(None),
            subscriptions: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    /// The abstract node this record was mounted from.
    pub fn source(&self) -> &AbstractNode<H> {
        &self.source
    }

    /// Physical output node, `None` for pass-through variants.
    pub fn handle(&self) -> Option<H> {
        self.handle.borrow().clone()
    }

    /// Anchor marker, `Some` for signal slots and boundaries.
    pub fn marker(&self) -> Option<H> {
        self.marker.borrow().clone()
    }

    /// Snapshot of the mounted children.
    pub fn children(&self) -> Vec<Rc<RenderedNode<H>>> {
        self.children.borrow().clone()
    }

    /// Number of live subscriptions held directly by this record.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    pub(crate) fn push_subscription(&self, disposer: Disposer) {
        self.subscriptions.borrow_mut().push(disposer);
    }

    pub(crate) fn set_children(&self, children: Vec<Rc<RenderedNode<H>>>) {
        *self.children.borrow_mut() = children;
    }
}

impl<H: Clone + fmt::Debug + 'static> fmt::Debug for RenderedNode<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedNode")
            .field("handle", &self.handle.borrow())
            .field("marker", &self.marker.borrow())
            .field("children", &self.children.borrow().len())
            .finish()
    }
}

// =============================================================================
// Node Collection
// =============================================================================

/// Collect the physical output nodes a mounted subtree occupies in its
/// logical container, in document order.
///
/// The rule is uniform for every variant (components are never
/// special-cased relative to their resolved content): a record with a
/// physical handle contributes exactly that handle; a portal contributes
/// nothing (its nodes live in another container); every other pass-through
/// record contributes its marker, if any, then recurses into children.
pub fn collect_nodes<H: Clone + 'static>(rendered: &Rc<RenderedNode<H>>) -> Vec<H> {
    let mut out = Vec::new();
    collect_into(rendered, &mut out);
    out
}

fn collect_into<H: Clone + 'static>(rendered: &Rc<RenderedNode<H>>, out: &mut Vec<H>) {
    if matches!(rendered.source, AbstractNode::Portal { .. }) {
        return;
    }
    if let Some(marker) = rendered.marker() {
        out.push(marker);
    }
    if let Some(handle) = rendered.handle() {
        out.push(handle);
        return;
    }
    for child in rendered.children.borrow().iter() {
        collect_into(child, out);
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// The reconciliation engine over one render strategy.
///
/// Cheap to clone (shares the strategy); every mounted subtree keeps the
/// renderer alive through its patch closures.
pub struct Renderer<S: RenderStrategy> {
    strategy: Rc<S>,
}

impl<S: RenderStrategy> Clone for Renderer<S> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy.clone(),
        }
    }
}

impl<S: RenderStrategy + 'static> Renderer<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy: Rc::new(strategy),
        }
    }

    /// The backend this renderer drives.
    pub fn strategy(&self) -> &Rc<S> {
        &self.strategy
    }

    // =========================================================================
    // Mount
    // =========================================================================

    /// Mount `node` under `ctx`, appending its output into `container`.
    ///
    /// Synchronous; runs to completion. `Err` means a component in the
    /// subtree failed and no enclosing error boundary caught it - nothing of
    /// the failed subtree stays attached.
    pub fn mount(
        &self,
        node: &AbstractNode<S::Handle>,
        ctx: &ContextEnv,
        container: &S::Handle,
    ) -> Result<Rc<RenderedNode<S::Handle>>, RenderError> {
        let rendered = RenderedNode::new(node.clone());

        match node {
            AbstractNode::Text { value, source } => {
                let handle = self.strategy.create_text(value);
                self.strategy.append_child(container, &handle);
                *rendered.handle.borrow_mut() = Some(handle.clone());

                if let Some(cell) = source {
                    let strategy = self.strategy.clone();
                    let handle = handle.clone();
                    rendered.push_subscription(cell.subscribe(Box::new(move |value| {
                        strategy.set_property(&handle, "text", &PropLiteral::Str(value));
                    })));
                }
            }

            AbstractNode::Element {
                tag,
                props,
                children,
            } => {
                let handle = self.strategy.create_element(tag);
                for (key, entry) in props {
                    match entry {
                        PropEntry::Value(value) => {
                            self.strategy.set_property(&handle, key, value);
                        }
                        PropEntry::Cell(cell) => {
                            let disposer =
                                self.strategy.clone().set_cell_property(&handle, key, cell);
                            rendered.push_subscription(disposer);
                        }
                        PropEntry::Ref(binding) => {
                            rendered.push_subscription(self.strategy.set_ref(&handle, binding));
                        }
                    }
                }
                self.strategy.append_child(container, &handle);
                *rendered.handle.borrow_mut() = Some(handle.clone());

                match self.mount_list(children, ctx, &handle) {
                    Ok(mounted) => rendered.set_children(mounted),
                    Err(err) => {
                        self.release_subscriptions(&rendered);
                        self.strategy.remove_child(container, &handle);
                        return Err(err);
                    }
                }
            }

            AbstractNode::Component {
                func,
                props,
                children,
            } => {
                let resolved = resolver::resolve_component(func, props.clone(), children.clone(), ctx)?;
                let child = self.mount(&resolved, ctx, container)?;
                rendered.set_children(vec![child]);
            }

            AbstractNode::Fragment { children } => {
                rendered.set_children(self.mount_list(children, ctx, container)?);
            }

            AbstractNode::Portal {
                container: target,
                children,
            } => {
                rendered.set_children(self.mount_list(children, ctx, target)?);
            }

            AbstractNode::Provider { bindings, children } => {
                let extended = ctx.with_all(bindings);
                rendered.set_children(self.mount_list(children, &extended, container)?);
            }

            AbstractNode::Signal { cell, captured } => {
                let marker = self.strategy.create_comment("signal");
                self.strategy.append_child(container, &marker);
                *rendered.marker.borrow_mut() = Some(marker.clone());

                let slot_ctx = captured.clone().unwrap_or_else(|| ctx.clone());
                let content = cell.current().into_node();
                match self.mount(&content, &slot_ctx, container) {
                    Ok(child) => rendered.set_children(vec![child]),
                    Err(err) => {
                        self.strategy.remove_child(container, &marker);
                        return Err(err);
                    }
                }

                // The listener owns the slot record: the mounted slot stays
                // alive as long as the cell can fire, even after the caller
                // drops the mount handle. The resulting cycle (cell ->
                // listener -> slot -> source cell) is cut at unmount, when
                // the disposer removes the listener from the cell.
                let renderer = self.clone();
                let slot = Rc::clone(&rendered);
                let marker = marker.clone();
                let slot_ctx_for_fire = slot_ctx.clone();
                rendered.push_subscription(cell.subscribe(Box::new(move |value| {
                    renderer.patch(&slot, &marker, &slot_ctx_for_fire, value);
                })));
            }

            AbstractNode::ErrorBoundary {
                fallback,
                on_error,
                children,
            } => {
                boundary::mount_error_boundary(
                    self,
                    &rendered,
                    fallback.clone(),
                    on_error.clone(),
                    children.clone(),
                    ctx,
                    container,
                )?;
            }

            AbstractNode::Suspense { fallback, children } => {
                boundary::mount_suspense(
                    self,
                    &rendered,
                    fallback.clone(),
                    children.clone(),
                    ctx,
                    container,
                )?;
            }
        }

        Ok(rendered)
    }

    /// Mount a sibling list; on failure, unmount what was already mounted
    /// before propagating.
    fn mount_list(
        &self,
        nodes: &[AbstractNode<S::Handle>],
        ctx: &ContextEnv,
        container: &S::Handle,
    ) -> Result<Vec<Rc<RenderedNode<S::Handle>>>, RenderError> {
        let mut mounted = Vec::with_capacity(nodes.len());
        for node in nodes {
            match self.mount(node, ctx, container) {
                Ok(rendered) => mounted.push(rendered),
                Err(err) => {
                    for rendered in &mounted {
                        self.unmount(rendered);
                    }
                    return Err(err);
                }
            }
        }
        Ok(mounted)
    }

    // =========================================================================
    // Patch
    // =========================================================================

    /// Signal-driven update of one slot. Everything outside the slot's most
    /// recent mounted value is untouched.
    fn patch(
        &self,
        slot: &Rc<RenderedNode<S::Handle>>,
        marker: &S::Handle,
        ctx: &ContextEnv,
        value: RenderValue<S::Handle>,
    ) {
        if let Err(err) = self.replace_slot_content(slot, marker, ctx, &value.into_node()) {
            // A component inside the new content failed. Hand the error to
            // the nearest boundary from the captured context; without one,
            // the old content stays in place.
            if !boundary::report_to_channel(ctx, err.clone()) {
                tracing::error!(error = %err, "signal patch abandoned");
            }
        }
    }

    /// Swap the content behind `marker`: mount `node`, remove the slot's old
    /// output nodes, insert the new ones right after the marker, release the
    /// old subtree's subscriptions, and replace the slot's children.
    ///
    /// Also the boundary transition primitive (content ↔ fallback).
    pub(crate) fn replace_slot_content(
        &self,
        slot: &Rc<RenderedNode<S::Handle>>,
        marker: &S::Handle,
        ctx: &ContextEnv,
        node: &AbstractNode<S::Handle>,
    ) -> Result<(), RenderError> {
        let Some(parent) = self.strategy.parent(marker) else {
            return Err(RenderError::Backend(
                "slot marker is not attached to the output tree".into(),
            ));
        };

        // Mount first (appends at the container end); a failure here leaves
        // the old content fully intact.
        let new_rendered = self.mount(node, ctx, &parent)?;

        let old_children = slot.children();
        let mut old_nodes = Vec::new();
        for child in &old_children {
            collect_into(child, &mut old_nodes);
        }
        let new_nodes = collect_nodes(&new_rendered);

        // Offer equal-length collections to the backend's reuse hook.
        let mut reused = vec![false; new_nodes.len()];
        if old_nodes.len() == new_nodes.len() {
            for (index, (old, new)) in old_nodes.iter().zip(&new_nodes).enumerate() {
                reused[index] = self.strategy.try_reuse(old, new);
            }
        }

        // Removal precedes insertion: the backend never sees two competing
        // subtrees in the slot.
        for (index, node) in old_nodes.iter().enumerate() {
            if reused.get(index).copied().unwrap_or(false) {
                continue;
            }
            if let Some(parent) = self.strategy.parent(node) {
                self.strategy.remove_child(&parent, node);
            }
        }

        let mut anchor = marker.clone();
        for (index, node) in new_nodes.iter().enumerate() {
            if reused[index] {
                // Backend kept the old node; drop the fresh one and keep the
                // survivor in the anchor chain.
                if let Some(p) = self.strategy.parent(node) {
                    self.strategy.remove_child(&p, node);
                }
                let survivor = old_nodes[index].clone();
                let before = self.strategy.next_sibling(&anchor);
                self.strategy.insert_before(&parent, &survivor, before.as_ref());
                anchor = survivor;
            } else {
                let before = self.strategy.next_sibling(&anchor);
                self.strategy.insert_before(&parent, node, before.as_ref());
                anchor = node.clone();
            }
        }

        for child in &old_children {
            self.release_subscriptions(child);
            // Collection skipped portal content (it lives in a foreign
            // container), so removal has to visit it explicitly.
            self.remove_portal_output(child);
        }

        slot.set_children(vec![new_rendered]);
        Ok(())
    }

    /// Remove the output of every portal in the subtree, leaving all other
    /// output nodes alone. Portal content never enters the reuse pairing
    /// (collection skips it), so this never touches a survivor.
    fn remove_portal_output(&self, rendered: &Rc<RenderedNode<S::Handle>>) {
        if matches!(rendered.source, AbstractNode::Portal { .. }) {
            for child in rendered.children.borrow().iter() {
                self.remove_output(child);
            }
            return;
        }
        for child in rendered.children.borrow().iter() {
            self.remove_portal_output(child);
        }
    }

    // =========================================================================
    // Unmount
    // =========================================================================

    /// Tear down a mounted subtree: release every subscription depth-first,
    /// then remove its output nodes (markers and portal content included).
    pub fn unmount(&self, rendered: &Rc<RenderedNode<S::Handle>>) {
        self.release_subscriptions(rendered);
        self.remove_output(rendered);
    }

    /// Release every subscription in the subtree without touching output
    /// nodes. For callers replacing the physical tree wholesale.
    pub fn release_subscriptions(&self, rendered: &Rc<RenderedNode<S::Handle>>) {
        for disposer in rendered.subscriptions.borrow_mut().drain(..) {
            disposer();
        }
        for child in rendered.children.borrow().iter() {
            self.release_subscriptions(child);
        }
    }

    fn remove_output(&self, rendered: &Rc<RenderedNode<S::Handle>>) {
        if let Some(marker) = rendered.marker() {
            if let Some(parent) = self.strategy.parent(&marker) {
                self.strategy.remove_child(&parent, &marker);
            }
        }
        if let Some(handle) = rendered.handle() {
            if let Some(parent) = self.strategy.parent(&handle) {
                self.strategy.remove_child(&parent, &handle);
            }
        }
        // Recurse regardless: portal content and nested markers live in
        // containers that removing this node's own handle does not clear.
        for child in rendered.children.borrow().iter() {
            self.remove_output(child);
        }
    }
}
