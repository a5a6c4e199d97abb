//! # spark-render
//!
//! Platform-agnostic reactive renderer for Rust.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for
//! fine-grained reactivity: a signal slot in the node tree patches exactly its
//! own output nodes when its cell fires, with no diffing pass and no re-walk
//! of the surrounding tree.
//!
//! ## Architecture
//!
//! An application describes its UI as an [`AbstractNode`] tree. The engine
//! mounts that tree through a [`RenderStrategy`] - the small trait a backend
//! implements over its own node handles (DOM elements, terminal regions,
//! whatever the output medium offers). Mounting produces a [`RenderedNode`]
//! tree that owns output handles and subscription disposers:
//!
//! ```text
//! AbstractNode tree → mount → RenderedNode tree → cell fires → patch one slot
//! ```
//!
//! Dynamic content flows through reactive cells ([`ReactiveCell`]): every
//! signal slot plants a permanent marker node and swaps the content behind it
//! on each update. Components resolve synchronously, or asynchronously via
//! [`Deferred`] / [`ValueStream`] results that are normalized into ordinary
//! signal slots.
//!
//! ## Modules
//!
//! - [`types`] - `Disposer`, property literals, `RenderError`
//! - [`cell`] - reactive cells, signal bridging, deferred values, streams
//! - [`context`] - context keys and the persistent context environment
//! - [`node`] - the abstract node tree and its constructors
//! - [`strategy`] - the `RenderStrategy` backend contract
//! - [`backend`] - the in-memory reference backend
//! - [`engine`] - mount, patch, unmount; component resolution; boundaries

pub mod backend;
pub mod cell;
pub mod context;
pub mod engine;
pub mod node;
pub mod strategy;
pub mod types;

// Re-export commonly used items
pub use types::{noop_disposer, Disposer, PropLiteral, RenderError};

pub use cell::{
    cell_from_signal, deferred, value_stream, CellRef, Deferred, DeferredHandle, ReactiveCell,
    StreamEvent, StreamHandle, ValueCell, ValueStream,
};

pub use context::{ContextEnv, ContextKey, ContextValue};

pub use node::{
    component, element, error_boundary, fragment, portal, provider, reactive_text, signal_node,
    signal_view, suspense, text, AbstractNode, ComponentFn, ComponentProps, ComponentResult,
    ComponentScope, ErrorFallbackFn, NodeCell, OnErrorFn, PropCell, PropEntry, PropMap, RefFn,
    RenderValue, RetryFn, SuspenseFallbackFn,
};

pub use strategy::RenderStrategy;

pub use backend::{MemoryBackend, MemoryHandle};

pub use engine::{
    collect_nodes, resolve_component, BoundaryPhase, RenderedNode, Renderer, SuspensePhase,
};
