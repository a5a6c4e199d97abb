//! Shared leaf types - Disposer, property literals, errors.
//!
//! These are the types every other module speaks: the cleanup callback
//! contract, the closed set of values a backend can receive for a property,
//! and the error taxonomy for everything the engine recovers from.

use thiserror::Error;

// =============================================================================
// Disposer
// =============================================================================

/// Callback that releases one subscription (or one resource) exactly once.
///
/// Returned by every `subscribe` in the crate and by the backend's
/// `set_cell_property`/`set_ref`. Call it to release; dropping it without
/// calling leaks the subscription until the owning side is torn down.
pub type Disposer = Box<dyn FnOnce()>;

/// A disposer that releases nothing.
pub fn noop_disposer() -> Disposer {
    Box::new(|| {})
}

// =============================================================================
// Property Literals
// =============================================================================

/// A concrete property value as delivered to a backend.
///
/// Backends interpret these however their output tree requires (attribute
/// strings for a DOM, style fields for a terminal grid). The set is closed:
/// anything richer travels through a ref binding instead.
#[derive(Debug, Clone, PartialEq)]
pub enum PropLiteral {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PropLiteral {
    /// Render the literal the way a text-oriented backend would print it.
    pub fn to_display(&self) -> String {
        match self {
            PropLiteral::Null => String::new(),
            PropLiteral::Bool(b) => b.to_string(),
            PropLiteral::Int(n) => n.to_string(),
            PropLiteral::Float(f) => f.to_string(),
            PropLiteral::Str(s) => s.clone(),
        }
    }
}

impl From<bool> for PropLiteral {
    fn from(value: bool) -> Self {
        PropLiteral::Bool(value)
    }
}

impl From<i64> for PropLiteral {
    fn from(value: i64) -> Self {
        PropLiteral::Int(value)
    }
}

impl From<f64> for PropLiteral {
    fn from(value: f64) -> Self {
        PropLiteral::Float(value)
    }
}

impl From<&str> for PropLiteral {
    fn from(value: &str) -> Self {
        PropLiteral::Str(value.to_string())
    }
}

impl From<String> for PropLiteral {
    fn from(value: String) -> Self {
        PropLiteral::Str(value)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Everything the engine recovers from (or hands to a boundary).
///
/// Programmer defects in tree construction are *not* represented here; those
/// panic at mount time. This enum covers runtime conditions: a component
/// function failing, a deferred value rejecting, a stream producer failing,
/// or a boundary rule being violated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    /// A component function returned an error during its synchronous render.
    #[error("component failed: {0}")]
    Component(String),

    /// A deferred component value was rejected by its producer.
    #[error("deferred value rejected: {0}")]
    Rejected(String),

    /// An asynchronous value sequence raised a failure.
    #[error("value stream failed: {0}")]
    StreamFailed(String),

    /// A suspense fallback resolved to a deferred/streaming result.
    /// Fallback content must resolve synchronously.
    #[error("suspense fallback must resolve synchronously")]
    DeferredFallback,

    /// The backend broke the render-strategy contract (e.g. a patch anchor
    /// that is no longer attached to the output tree).
    #[error("backend contract violation: {0}")]
    Backend(String),
}

impl RenderError {
    /// A component failure with `msg` as its reason.
    pub fn component(msg: impl Into<String>) -> Self {
        RenderError::Component(msg.into())
    }

    /// A deferred rejection with `msg` as its reason.
    pub fn rejected(msg: impl Into<String>) -> Self {
        RenderError::Rejected(msg.into())
    }

    /// A stream failure with `msg` as its reason.
    pub fn stream_failed(msg: impl Into<String>) -> Self {
        RenderError::StreamFailed(msg.into())
    }

    /// A backend contract violation with `msg` as its reason.
    pub fn backend(msg: impl Into<String>) -> Self {
        RenderError::Backend(msg.into())
    }
}
