//! In-memory output tree - the reference render strategy.
//!
//! A [`MemoryHandle`] is a shared reference to one node: text, comment
//! (marker), or element with properties and ordered children. The backend
//! itself is zero-sized; all state lives in the node graph. `to_markup`
//! renders an HTML-ish snapshot for assertions.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::strategy::RenderStrategy;
use crate::types::PropLiteral;

// =============================================================================
// Nodes
// =============================================================================

enum MemoryKind {
    Text(String),
    Comment(String),
    Element {
        tag: String,
        props: Vec<(String, PropLiteral)>,
    },
}

struct MemoryNodeData {
    kind: MemoryKind,
    parent: Weak<RefCell<MemoryNodeData>>,
    children: Vec<MemoryHandle>,
}

/// Shared reference to one in-memory output node. Identity is pointer
/// identity; `Clone` shares the node.
#[derive(Clone)]
pub struct MemoryHandle {
    data: Rc<RefCell<MemoryNodeData>>,
}

impl PartialEq for MemoryHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for MemoryHandle {}

impl std::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryHandle({})", self.to_markup())
    }
}

impl MemoryHandle {
    fn new(kind: MemoryKind) -> Self {
        Self {
            data: Rc::new(RefCell::new(MemoryNodeData {
                kind,
                parent: Weak::new(),
                children: Vec::new(),
            })),
        }
    }

    /// Element tag, if this is an element.
    pub fn tag(&self) -> Option<String> {
        match &self.data.borrow().kind {
            MemoryKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    /// Text content, if this is a text node.
    pub fn text(&self) -> Option<String> {
        match &self.data.borrow().kind {
            MemoryKind::Text(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether this is a comment/marker node.
    pub fn is_comment(&self) -> bool {
        matches!(self.data.borrow().kind, MemoryKind::Comment(_))
    }

    /// Current property value on an element.
    pub fn prop(&self, key: &str) -> Option<PropLiteral> {
        match &self.data.borrow().kind {
            MemoryKind::Element { props, .. } => props
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Vec<MemoryHandle> {
        self.data.borrow().children.clone()
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.data.borrow().children.len()
    }

    /// Concatenated text of this node and its descendants, markers skipped.
    pub fn text_content(&self) -> String {
        let data = self.data.borrow();
        match &data.kind {
            MemoryKind::Text(value) => value.clone(),
            MemoryKind::Comment(_) => String::new(),
            MemoryKind::Element { .. } => data
                .children
                .iter()
                .map(MemoryHandle::text_content)
                .collect(),
        }
    }

    /// HTML-ish snapshot of the subtree, for test assertions.
    pub fn to_markup(&self) -> String {
        let data = self.data.borrow();
        match &data.kind {
            MemoryKind::Text(value) => value.clone(),
            MemoryKind::Comment(label) => format!("<!--{label}-->"),
            MemoryKind::Element { tag, props } => {
                let mut out = String::new();
                out.push('<');
                out.push_str(tag);
                for (key, value) in props {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&value.to_display());
                    out.push('"');
                }
                out.push('>');
                for child in &data.children {
                    out.push_str(&child.to_markup());
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
                out
            }
        }
    }

    fn detach(&self) {
        let parent = self.data.borrow().parent.upgrade();
        if let Some(parent) = parent {
            parent
                .borrow_mut()
                .children
                .retain(|child| !Rc::ptr_eq(&child.data, &self.data));
            self.data.borrow_mut().parent = Weak::new();
        }
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Zero-sized strategy over the in-memory node graph.
#[derive(Default)]
pub struct MemoryBackend;

impl MemoryBackend {
    pub fn new() -> Self {
        Self
    }

    /// Convenience root container for mounting.
    pub fn create_root(&self) -> MemoryHandle {
        self.create_element("root")
    }
}

impl RenderStrategy for MemoryBackend {
    type Handle = MemoryHandle;

    fn create_text(&self, value: &str) -> MemoryHandle {
        MemoryHandle::new(MemoryKind::Text(value.to_string()))
    }

    fn create_comment(&self, label: &str) -> MemoryHandle {
        MemoryHandle::new(MemoryKind::Comment(label.to_string()))
    }

    fn create_element(&self, tag: &str) -> MemoryHandle {
        MemoryHandle::new(MemoryKind::Element {
            tag: tag.to_string(),
            props: Vec::new(),
        })
    }

    fn parent(&self, node: &MemoryHandle) -> Option<MemoryHandle> {
        node.data
            .borrow()
            .parent
            .upgrade()
            .map(|data| MemoryHandle { data })
    }

    fn next_sibling(&self, node: &MemoryHandle) -> Option<MemoryHandle> {
        let parent = self.parent(node)?;
        let siblings = parent.data.borrow();
        let index = siblings
            .children
            .iter()
            .position(|child| child == node)?;
        siblings.children.get(index + 1).cloned()
    }

    fn insert_before(
        &self,
        parent: &MemoryHandle,
        node: &MemoryHandle,
        before: Option<&MemoryHandle>,
    ) {
        // Move semantics: an attached node detaches first.
        node.detach();
        let index = {
            let data = parent.data.borrow();
            match before {
                Some(before) => data
                    .children
                    .iter()
                    .position(|child| child == before)
                    .unwrap_or(data.children.len()),
                None => data.children.len(),
            }
        };
        parent.data.borrow_mut().children.insert(index, node.clone());
        node.data.borrow_mut().parent = Rc::downgrade(&parent.data);
    }

    fn append_child(&self, parent: &MemoryHandle, node: &MemoryHandle) {
        self.insert_before(parent, node, None);
    }

    fn remove_child(&self, parent: &MemoryHandle, node: &MemoryHandle) {
        parent
            .data
            .borrow_mut()
            .children
            .retain(|child| child != node);
        node.data.borrow_mut().parent = Weak::new();
    }

    fn replace_node(&self, old: &MemoryHandle, new: &MemoryHandle) {
        if let Some(parent) = self.parent(old) {
            let next = self.next_sibling(old);
            self.remove_child(&parent, old);
            self.insert_before(&parent, new, next.as_ref());
        }
    }

    fn set_property(&self, node: &MemoryHandle, key: &str, value: &PropLiteral) {
        let mut data = node.data.borrow_mut();
        match &mut data.kind {
            MemoryKind::Text(content) if key == "text" => {
                *content = value.to_display();
            }
            MemoryKind::Element { props, .. } => {
                match props.iter_mut().find(|(k, _)| k == key) {
                    Some((_, slot)) => *slot = value.clone(),
                    None => props.push((key.to_string(), value.clone())),
                }
            }
            _ => {}
        }
    }
}
