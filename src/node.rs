//! Abstract node model - the immutable tree description.
//!
//! An [`AbstractNode`] describes one tree position. Nodes are immutable once
//! constructed: a "change" is always a brand-new node delivered through a
//! reactive cell, never an in-place mutation. The enum is closed and matched
//! exhaustively, so an unrecognized variant cannot exist at runtime.
//!
//! Everything is generic over `H`, the backend's output-node handle type
//! (see [`crate::strategy::RenderStrategy`]): a portal names a physical
//! container, so handles appear in the tree description itself.
//!
//! # Renderable values
//!
//! Cells and deferred results do not have to hold nodes. [`RenderValue`] is
//! the closed set of payloads the engine can coerce to a node: nodes pass
//! through, lists become fragments, strings and numbers become text, and
//! `Empty`/`Bool` become an empty text node so a signal slot keeps a stable
//! anchor even when there is nothing to render.

use std::rc::Rc;

use spark_signals::Signal;

use crate::cell::{CellRef, Deferred, ValueStream, cell_from_signal};
use crate::context::{ContextEnv, ContextKey, ContextValue};
use crate::types::{PropLiteral, RenderError};

// =============================================================================
// Properties
// =============================================================================

/// Ref binding: called by the backend with the created output node.
pub type RefFn<H> = Rc<dyn Fn(&H)>;

/// A cell holding a property literal.
pub type PropCell = CellRef<PropLiteral>;

/// One property on an element.
#[derive(Clone)]
pub enum PropEntry<H: Clone + 'static> {
    /// Ordinary value, set once at mount.
    Value(PropLiteral),
    /// Reactive value, bound through the backend's `set_cell_property`.
    Cell(PropCell),
    /// Ref binding, installed through the backend's `set_ref`.
    Ref(RefFn<H>),
}

/// Ordered property list. Application order is the declaration order.
pub type PropMap<H> = Vec<(String, PropEntry<H>)>;

// =============================================================================
// Components
// =============================================================================

/// What a component function receives: its property map plus the abstract
/// children declared under it.
pub struct ComponentProps<H: Clone + 'static> {
    pub props: PropMap<H>,
    pub children: Vec<AbstractNode<H>>,
}

/// What the resolver sees when invoking a component.
///
/// `inject` reads the nearest-ancestor Provider binding; unbound keys fall
/// through to `None`, never an error.
pub struct ComponentScope {
    ctx: ContextEnv,
}

impl ComponentScope {
    pub(crate) fn new(ctx: ContextEnv) -> Self {
        Self { ctx }
    }

    /// Nearest Provider binding for `key`.
    pub fn inject(&self, key: &ContextKey) -> Option<ContextValue> {
        self.ctx.lookup(key)
    }

    /// Typed variant of [`inject`](Self::inject).
    pub fn inject_as<T: 'static>(&self, key: &ContextKey) -> Option<Rc<T>> {
        self.ctx.get::<T>(key)
    }

    /// The full environment active at resolution time.
    pub fn context(&self) -> &ContextEnv {
        &self.ctx
    }
}

/// The four resolution shapes a component may return.
pub enum ComponentResult<H: Clone + 'static> {
    /// Output available immediately; mounted with no cell involved.
    Node(AbstractNode<H>),
    /// A single value that settles later.
    Deferred(Deferred<RenderValue<H>>),
    /// Zero or more values over time, last write wins.
    Stream(ValueStream<RenderValue<H>>),
    /// An existing reactive cell, used as-is.
    Cell(NodeCell<H>),
}

impl<H: Clone + 'static> From<AbstractNode<H>> for ComponentResult<H> {
    fn from(node: AbstractNode<H>) -> Self {
        ComponentResult::Node(node)
    }
}

impl<H: Clone + 'static> From<RenderValue<H>> for ComponentResult<H> {
    fn from(value: RenderValue<H>) -> Self {
        ComponentResult::Node(value.into_node())
    }
}

/// A user-defined component: props in, resolution shape out. Synchronous
/// failures surface as `Err` and are caught by the nearest error boundary.
pub type ComponentFn<H> =
    Rc<dyn Fn(&ComponentProps<H>, &ComponentScope) -> Result<ComponentResult<H>, RenderError>>;

// =============================================================================
// Boundary callback shapes
// =============================================================================

/// Re-render callback handed to an error-boundary fallback.
pub type RetryFn = Rc<dyn Fn()>;

/// Error-boundary fallback renderer: receives the caught error and a retry
/// callback, returns the fallback content.
pub type ErrorFallbackFn<H> = Rc<dyn Fn(&RenderError, RetryFn) -> AbstractNode<H>>;

/// Error notification hook on an error boundary.
pub type OnErrorFn = Rc<dyn Fn(&RenderError)>;

/// Suspense fallback renderer. Must resolve synchronously.
pub type SuspenseFallbackFn<H> = Rc<dyn Fn() -> AbstractNode<H>>;

// =============================================================================
// Abstract Node
// =============================================================================

/// A cell holding a renderable value; what a `Signal` node watches.
pub type NodeCell<H> = CellRef<RenderValue<H>>;

/// Immutable description of one tree position.
#[derive(Clone)]
pub enum AbstractNode<H: Clone + 'static> {
    /// Leaf text. With a source cell, the content tracks the cell in place
    /// (no structural patch).
    Text {
        value: String,
        source: Option<CellRef<String>>,
    },
    /// A tagged output element with properties and ordered children.
    Element {
        tag: String,
        props: PropMap<H>,
        children: Vec<AbstractNode<H>>,
    },
    /// A user component, resolved at mount time.
    Component {
        func: ComponentFn<H>,
        props: PropMap<H>,
        children: Vec<AbstractNode<H>>,
    },
    /// Groups children; owns no output node.
    Fragment { children: Vec<AbstractNode<H>> },
    /// Children render into a different physical container than the logical
    /// parent; occupies no slot in the logical parent's child list.
    Portal {
        container: H,
        children: Vec<AbstractNode<H>>,
    },
    /// "Whatever this cell currently holds." Carries a frozen context
    /// snapshot so later fires see the environment active at creation time.
    Signal {
        cell: NodeCell<H>,
        captured: Option<ContextEnv>,
    },
    /// Extends context for descendants (copy-on-write overlay).
    Provider {
        bindings: Vec<(ContextKey, ContextValue)>,
        children: Vec<AbstractNode<H>>,
    },
    /// Catches descendant render failures and substitutes fallback content.
    ErrorBoundary {
        fallback: ErrorFallbackFn<H>,
        on_error: Option<OnErrorFn>,
        children: Vec<AbstractNode<H>>,
    },
    /// Shows fallback content while descendant deferred values are pending.
    Suspense {
        fallback: SuspenseFallbackFn<H>,
        children: Vec<AbstractNode<H>>,
    },
}

// =============================================================================
// Constructors
// =============================================================================

/// Static text leaf.
pub fn text<H: Clone + 'static>(value: &str) -> AbstractNode<H> {
    AbstractNode::Text {
        value: value.to_string(),
        source: None,
    }
}

/// Text leaf kept in sync with a string cell.
pub fn reactive_text<H: Clone + 'static>(source: CellRef<String>) -> AbstractNode<H> {
    AbstractNode::Text {
        value: source.current(),
        source: Some(source),
    }
}

/// Element node.
pub fn element<H: Clone + 'static>(
    tag: &str,
    props: PropMap<H>,
    children: Vec<AbstractNode<H>>,
) -> AbstractNode<H> {
    AbstractNode::Element {
        tag: tag.to_string(),
        props,
        children,
    }
}

/// Component node.
pub fn component<H, F>(func: F, props: PropMap<H>, children: Vec<AbstractNode<H>>) -> AbstractNode<H>
where
    H: Clone + 'static,
    F: Fn(&ComponentProps<H>, &ComponentScope) -> Result<ComponentResult<H>, RenderError> + 'static,
{
    AbstractNode::Component {
        func: Rc::new(func),
        props,
        children,
    }
}

/// Fragment node.
pub fn fragment<H: Clone + 'static>(children: Vec<AbstractNode<H>>) -> AbstractNode<H> {
    AbstractNode::Fragment { children }
}

/// Portal node targeting `container`.
pub fn portal<H: Clone + 'static>(container: H, children: Vec<AbstractNode<H>>) -> AbstractNode<H> {
    AbstractNode::Portal {
        container,
        children,
    }
}

/// Provider node overlaying `bindings` for its descendants.
pub fn provider<H: Clone + 'static>(
    bindings: Vec<(ContextKey, ContextValue)>,
    children: Vec<AbstractNode<H>>,
) -> AbstractNode<H> {
    AbstractNode::Provider { bindings, children }
}

/// Signal node over an existing cell. The resolver produces these
/// internally; constructing one directly is how an embedder drives a slot
/// from its own cell implementation.
pub fn signal_node<H: Clone + 'static>(cell: NodeCell<H>) -> AbstractNode<H> {
    AbstractNode::Signal {
        cell,
        captured: None,
    }
}

/// Error boundary node.
pub fn error_boundary<H: Clone + 'static>(
    fallback: impl Fn(&RenderError, RetryFn) -> AbstractNode<H> + 'static,
    on_error: Option<OnErrorFn>,
    children: Vec<AbstractNode<H>>,
) -> AbstractNode<H> {
    AbstractNode::ErrorBoundary {
        fallback: Rc::new(fallback),
        on_error,
        children,
    }
}

/// Suspense node.
pub fn suspense<H: Clone + 'static>(
    fallback: impl Fn() -> AbstractNode<H> + 'static,
    children: Vec<AbstractNode<H>>,
) -> AbstractNode<H> {
    AbstractNode::Suspense {
        fallback: Rc::new(fallback),
        children,
    }
}

/// Bridge an application signal straight into a signal node: `view` maps the
/// signal's value to renderable content, and the node patches on every
/// signal change.
pub fn signal_view<S, H>(
    source: &Signal<S>,
    view: impl Fn(S) -> RenderValue<H> + 'static,
) -> AbstractNode<H>
where
    S: Clone + PartialEq + 'static,
    H: Clone + 'static,
{
    signal_node(cell_from_signal(source, view))
}

// =============================================================================
// Render Values
// =============================================================================

/// A payload a cell (or deferred/stream) may deliver. Closed: every variant
/// is renderable, so the "non-renderable payload" defect cannot occur.
#[derive(Clone)]
pub enum RenderValue<H: Clone + 'static> {
    Node(AbstractNode<H>),
    List(Vec<RenderValue<H>>),
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Empty,
}

impl<H: Clone + 'static> RenderValue<H> {
    /// Coerce to a node.
    ///
    /// Lists wrap their entries in a fragment, discarding entries that are
    /// not nodes after coercion (`Empty` and `Bool`). At the top level,
    /// `Empty` and `Bool` coerce to an *empty text node* instead, so a
    /// signal slot always occupies exactly one position even when there is
    /// nothing to show.
    pub fn into_node(self) -> AbstractNode<H> {
        match self {
            RenderValue::Node(node) => node,
            RenderValue::List(items) => AbstractNode::Fragment {
                children: items
                    .into_iter()
                    .filter_map(RenderValue::into_list_entry)
                    .collect(),
            },
            RenderValue::Text(value) => AbstractNode::Text {
                value,
                source: None,
            },
            RenderValue::Int(n) => AbstractNode::Text {
                value: n.to_string(),
                source: None,
            },
            RenderValue::Float(f) => AbstractNode::Text {
                value: f.to_string(),
                source: None,
            },
            RenderValue::Bool(_) | RenderValue::Empty => AbstractNode::Text {
                value: String::new(),
                source: None,
            },
        }
    }

    fn into_list_entry(self) -> Option<AbstractNode<H>> {
        match self {
            RenderValue::Empty | RenderValue::Bool(_) => None,
            other => Some(other.into_node()),
        }
    }
}

impl<H: Clone + 'static> From<AbstractNode<H>> for RenderValue<H> {
    fn from(node: AbstractNode<H>) -> Self {
        RenderValue::Node(node)
    }
}

impl<H: Clone + 'static> From<&str> for RenderValue<H> {
    fn from(value: &str) -> Self {
        RenderValue::Text(value.to_string())
    }
}

impl<H: Clone + 'static> From<String> for RenderValue<H> {
    fn from(value: String) -> Self {
        RenderValue::Text(value)
    }
}

impl<H: Clone + 'static> From<i64> for RenderValue<H> {
    fn from(value: i64) -> Self {
        RenderValue::Int(value)
    }
}

impl<H: Clone + 'static> From<bool> for RenderValue<H> {
    fn from(value: bool) -> Self {
        RenderValue::Bool(value)
    }
}

impl<H: Clone + 'static, T: Into<RenderValue<H>>> From<Vec<T>> for RenderValue<H> {
    fn from(items: Vec<T>) -> Self {
        RenderValue::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Handle type is irrelevant for coercion tests.
    type N = AbstractNode<u32>;
    type V = RenderValue<u32>;

    fn text_value(node: &N) -> Option<&str> {
        match node {
            AbstractNode::Text { value, .. } => Some(value.as_str()),
            _ => None,
        }
    }

    #[test]
    fn test_string_and_number_coerce_to_text() {
        assert_eq!(text_value(&V::from("x").into_node()), Some("x"));
        assert_eq!(text_value(&V::from(42i64).into_node()), Some("42"));
        assert_eq!(text_value(&V::Float(1.5).into_node()), Some("1.5"));
    }

    #[test]
    fn test_empty_and_bool_coerce_to_empty_text() {
        for value in [V::Empty, V::Bool(true), V::Bool(false)] {
            assert_eq!(text_value(&value.into_node()), Some(""));
        }
    }

    #[test]
    fn test_list_coerces_to_fragment_dropping_non_nodes() {
        let value = V::List(vec![
            V::from("a"),
            V::Empty,
            V::Bool(true),
            V::from("b"),
        ]);
        match value.into_node() {
            AbstractNode::Fragment { children } => {
                assert_eq!(children.len(), 2);
                assert_eq!(text_value(&children[0]), Some("a"));
                assert_eq!(text_value(&children[1]), Some("b"));
            }
            _ => panic!("expected fragment"),
        }
    }

    #[test]
    fn test_node_passes_through() {
        let node: N = text("hello");
        match V::Node(node).into_node() {
            AbstractNode::Text { value, .. } => assert_eq!(value, "hello"),
            _ => panic!("expected text"),
        }
    }
}
