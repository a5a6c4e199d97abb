//! Render strategy - the backend capability contract.
//!
//! Each backend (a DOM binding, a terminal grid, the in-memory reference
//! tree) implements [`RenderStrategy`] for one physical output-tree kind.
//! The engine owns every output node it creates through a strategy; no
//! external actor should mutate those nodes.

use std::rc::Rc;

use crate::node::{PropCell, RefFn};
use crate::types::{Disposer, PropLiteral, noop_disposer};

/// Operation set for one physical output tree.
///
/// `Handle` is the backend's node reference; it must be cheap to clone and
/// compare by identity on the backend's side.
pub trait RenderStrategy {
    type Handle: Clone + 'static;

    /// Create a detached text node.
    fn create_text(&self, value: &str) -> Self::Handle;

    /// Create a detached invisible marker node. Markers anchor signal slots
    /// and boundaries; they stay in the tree for the slot's whole life.
    fn create_comment(&self, label: &str) -> Self::Handle;

    /// Create a detached element.
    fn create_element(&self, tag: &str) -> Self::Handle;

    /// Current parent, `None` when detached.
    fn parent(&self, node: &Self::Handle) -> Option<Self::Handle>;

    /// Next sibling under the same parent, `None` at the end.
    fn next_sibling(&self, node: &Self::Handle) -> Option<Self::Handle>;

    /// Insert `node` under `parent` before `before` (append when `None`).
    ///
    /// Inserting a node that is already attached *moves* it: the backend
    /// must detach it from its current position first. The patch step relies
    /// on this to reorder freshly mounted content behind its marker.
    fn insert_before(
        &self,
        parent: &Self::Handle,
        node: &Self::Handle,
        before: Option<&Self::Handle>,
    );

    /// Append `node` as the last child of `parent`.
    fn append_child(&self, parent: &Self::Handle, node: &Self::Handle);

    /// Remove `node` from `parent`.
    fn remove_child(&self, parent: &Self::Handle, node: &Self::Handle);

    /// Replace `old` with `new` in `old`'s parent.
    fn replace_node(&self, old: &Self::Handle, new: &Self::Handle);

    /// Set a property on a node. For text nodes the key `"text"` replaces
    /// the content in place.
    fn set_property(&self, node: &Self::Handle, key: &str, value: &PropLiteral);

    /// Bind a property to a reactive cell: set the current value, then track
    /// changes. Returns the disposer releasing the subscription.
    ///
    /// The provided body covers any backend; override to batch or coalesce.
    fn set_cell_property(
        self: Rc<Self>,
        node: &Self::Handle,
        key: &str,
        cell: &PropCell,
    ) -> Disposer
    where
        Self: Sized + 'static,
    {
        self.set_property(node, key, &cell.current());
        let node = node.clone();
        let key = key.to_string();
        let strategy = self;
        cell.subscribe(Box::new(move |value| {
            strategy.set_property(&node, &key, &value);
        }))
    }

    /// Install a ref binding. The provided body invokes the binding once
    /// with the node and releases nothing.
    fn set_ref(&self, node: &Self::Handle, binding: &RefFn<Self::Handle>) -> Disposer {
        binding(node);
        noop_disposer()
    }

    /// Backend-specific patch optimization: given the outgoing and incoming
    /// output node for the same slot position, the backend may update `old`
    /// in place to match `new` and return `true`; the engine then keeps
    /// `old` in the tree and discards `new`. Defaults to `false`.
    fn try_reuse(&self, _old: &Self::Handle, _new: &Self::Handle) -> bool {
        false
    }
}
