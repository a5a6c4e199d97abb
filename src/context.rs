//! Context - identity-keyed values scoped to a subtree.
//!
//! A [`ContextKey`] is an opaque token; equality is pointer identity, so two
//! keys never collide even with the same debug label. A [`ContextEnv`] is a
//! persistent association list: a Provider overlays bindings by pushing
//! frames, siblings and ancestors keep their own view (structural sharing,
//! never destructive update). Lookup walks outward from the innermost frame,
//! which makes shadowing innermost-wins without any extra bookkeeping.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// Context Key
// =============================================================================

struct KeyInner {
    label: Option<String>,
}

/// Opaque unique token for context lookup.
///
/// Create with [`ContextKey::new`] (labelled, for debugging) or
/// [`ContextKey::anonymous`]. Cloning shares the identity.
#[derive(Clone)]
pub struct ContextKey {
    inner: Rc<KeyInner>,
}

impl ContextKey {
    /// Create a key with a debug label.
    pub fn new(label: &str) -> Self {
        Self {
            inner: Rc::new(KeyInner {
                label: Some(label.to_string()),
            }),
        }
    }

    /// Create a key without a label.
    pub fn anonymous() -> Self {
        Self {
            inner: Rc::new(KeyInner { label: None }),
        }
    }

    /// The debug label, if one was given.
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }
}

impl PartialEq for ContextKey {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ContextKey {}

impl fmt::Debug for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "ContextKey({label})"),
            None => write!(f, "ContextKey({:p})", Rc::as_ptr(&self.inner)),
        }
    }
}

// =============================================================================
// Context Environment
// =============================================================================

/// A context-bound value. Downcast with [`ContextEnv::get`].
pub type ContextValue = Rc<dyn Any>;

struct Frame {
    key: ContextKey,
    value: ContextValue,
    next: Option<Rc<Frame>>,
}

/// Persistent key → value environment for one subtree.
///
/// Cheap to clone; `with` returns a new environment sharing every existing
/// frame. Insertion order is irrelevant except that a later binding for the
/// same key shadows the earlier one.
#[derive(Clone, Default)]
pub struct ContextEnv {
    head: Option<Rc<Frame>>,
}

impl ContextEnv {
    /// The empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend with one binding. `self` is unchanged.
    pub fn with(&self, key: ContextKey, value: ContextValue) -> Self {
        Self {
            head: Some(Rc::new(Frame {
                key,
                value,
                next: self.head.clone(),
            })),
        }
    }

    /// Extend with one typed binding.
    pub fn with_value<T: 'static>(&self, key: ContextKey, value: T) -> Self {
        self.with(key, Rc::new(value))
    }

    /// Extend with several bindings at once (a Provider's binding list).
    pub fn with_all(&self, bindings: &[(ContextKey, ContextValue)]) -> Self {
        let mut env = self.clone();
        for (key, value) in bindings {
            env = env.with(key.clone(), value.clone());
        }
        env
    }

    /// Look up the nearest binding for `key`. `None` if unbound, never an
    /// error.
    pub fn lookup(&self, key: &ContextKey) -> Option<ContextValue> {
        let mut frame = self.head.as_ref();
        while let Some(f) = frame {
            if f.key == *key {
                return Some(f.value.clone());
            }
            frame = f.next.as_ref();
        }
        None
    }

    /// Typed lookup: nearest binding for `key`, downcast to `T`.
    pub fn get<T: 'static>(&self, key: &ContextKey) -> Option<Rc<T>> {
        self.lookup(key).and_then(|v| v.downcast::<T>().ok())
    }

    /// Whether any binding exists for `key`.
    pub fn contains(&self, key: &ContextKey) -> bool {
        self.lookup(key).is_some()
    }
}

impl fmt::Debug for ContextEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = Vec::new();
        let mut frame = self.head.as_ref();
        while let Some(fr) = frame {
            keys.push(fr.key.clone());
            frame = fr.next.as_ref();
        }
        f.debug_tuple("ContextEnv").field(&keys).finish()
    }
}
