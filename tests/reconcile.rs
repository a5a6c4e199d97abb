//! End-to-end reconciliation against the in-memory backend.
//!
//! Exercises the structural guarantees: mount output matches the tree shape,
//! a signal slot patches only its own output nodes at its own position, and
//! unmount releases every subscription it took.

use std::rc::Rc;

use spark_render::{
    collect_nodes, fragment, portal, provider, reactive_text, signal_node, signal_view, text,
    AbstractNode, ContextEnv, ContextKey, ContextValue, MemoryBackend, MemoryHandle, PropEntry,
    PropLiteral, RenderStrategy, RenderValue, Renderer, ValueCell,
};

type Node = AbstractNode<MemoryHandle>;
type Value = RenderValue<MemoryHandle>;

fn setup() -> (Renderer<MemoryBackend>, MemoryHandle) {
    let renderer = Renderer::new(MemoryBackend::new());
    let root = renderer.strategy().create_root();
    (renderer, root)
}

// =============================================================================
// Structure
// =============================================================================

#[test]
fn test_static_tree_markup() {
    let (renderer, root) = setup();
    let tree: Node = spark_render::element(
        "row",
        vec![
            ("gap".into(), PropEntry::Value(PropLiteral::Int(2))),
            ("title".into(), PropEntry::Value(PropLiteral::Str("top".into()))),
        ],
        vec![
            text("left"),
            spark_render::element("col", vec![], vec![text("right")]),
        ],
    );
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(
        root.to_markup(),
        "<root><row gap=\"2\" title=\"top\">left<col>right</col></row></root>"
    );
}

#[test]
fn test_fragments_flatten_in_order() {
    let (renderer, root) = setup();
    let tree: Node = fragment(vec![
        fragment(vec![text("1"), text("2")]),
        text("3"),
        fragment(vec![fragment(vec![text("4")])]),
    ]);
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(root.text_content(), "1234");
    assert_eq!(root.child_count(), 4);
}

#[test]
fn test_ref_binding_runs_once_with_handle() {
    let (renderer, root) = setup();
    let captured: Rc<std::cell::RefCell<Option<MemoryHandle>>> = Rc::default();
    let captured_clone = captured.clone();
    let tree: Node = spark_render::element(
        "box",
        vec![(
            "ref".into(),
            PropEntry::Ref(Rc::new(move |h: &MemoryHandle| {
                *captured_clone.borrow_mut() = Some(h.clone());
            })),
        )],
        vec![],
    );
    let rendered = renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(captured.borrow().clone(), rendered.handle());
}

// =============================================================================
// Signal slots
// =============================================================================

#[test]
fn test_adjacent_slots_patch_independently() {
    let (renderer, root) = setup();
    let first = ValueCell::new(Value::from("a"));
    let second = ValueCell::new(Value::from("b"));
    let tree: Node = fragment(vec![
        text("start"),
        signal_node(Rc::new(first.clone())),
        signal_node(Rc::new(second.clone())),
        text("end"),
    ]);
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(root.text_content(), "startabend");

    // Growing the first slot lands between "start" and the second slot.
    first.set(Value::from(vec!["a1", "a2", "a3"]));
    assert_eq!(root.text_content(), "starta1a2a3bend");

    second.set(Value::Empty);
    assert_eq!(root.text_content(), "starta1a2a3end");

    first.set(Value::from("a"));
    assert_eq!(root.text_content(), "startaend");
}

#[test]
fn test_slot_patch_preserves_sibling_identity() {
    let (renderer, root) = setup();
    let cell = ValueCell::new(Value::from("mid"));
    let tree: Node = fragment(vec![
        text("before"),
        signal_node(Rc::new(cell.clone())),
        text("after"),
    ]);
    let rendered = renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();

    let nodes = collect_nodes(&rendered);
    let before = nodes.first().unwrap().clone();
    let after = nodes.last().unwrap().clone();

    for value in ["x", "y", "z"] {
        cell.set(Value::from(value));
    }
    let nodes = collect_nodes(&rendered);
    assert_eq!(nodes.first().unwrap(), &before);
    assert_eq!(nodes.last().unwrap(), &after);
    assert_eq!(root.text_content(), "beforezafter");
}

#[test]
fn test_nested_slots_inner_patch_then_outer_replace() {
    let (renderer, root) = setup();
    let inner = ValueCell::new(Value::from("i"));
    let inner_node: Node = signal_node(Rc::new(inner.clone()));
    let outer = ValueCell::new(Value::Node(fragment(vec![text("("), inner_node, text(")")])));
    let tree: Node = signal_node(Rc::new(outer.clone()));
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();

    inner.set(Value::from("inner2"));
    assert_eq!(root.text_content(), "(inner2)");

    outer.set(Value::from("gone"));
    assert_eq!(root.text_content(), "gone");
    // The replaced inner slot no longer listens.
    assert_eq!(inner.listener_count(), 0);
    inner.set(Value::from("late"));
    assert_eq!(root.text_content(), "gone");
}

// =============================================================================
// spark-signals bridge
// =============================================================================

#[test]
fn test_signal_view_patches_on_set() {
    use spark_signals::signal;

    let (renderer, root) = setup();
    let count = signal(0i64);
    let tree: Node = fragment(vec![
        text("count:"),
        signal_view(&count, |n| Value::from(n)),
    ]);
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(root.text_content(), "count:0");

    count.set(7);
    assert_eq!(root.text_content(), "count:7");
    count.set(-3);
    assert_eq!(root.text_content(), "count:-3");
}

#[test]
fn test_signal_prop_updates_without_remount() {
    use spark_signals::signal;

    let (renderer, root) = setup();
    let width = signal(10i64);
    let cell = spark_render::cell_from_signal(&width, PropLiteral::Int);
    let tree: Node = spark_render::element(
        "box",
        vec![("width".into(), PropEntry::Cell(cell))],
        vec![],
    );
    let rendered = renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    let el = rendered.handle().unwrap();
    assert_eq!(el.prop("width"), Some(PropLiteral::Int(10)));

    width.set(25);
    // Same element handle, updated property: no structural churn.
    assert_eq!(rendered.handle().unwrap(), el);
    assert_eq!(el.prop("width"), Some(PropLiteral::Int(25)));
    assert_eq!(root.child_count(), 1);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_unmount_releases_every_subscription() {
    let (renderer, root) = setup();
    let slot_cell = ValueCell::new(Value::from("s"));
    let text_cell = ValueCell::new(String::from("t"));
    let prop_cell = ValueCell::new(PropLiteral::Bool(true));

    let tree: Node = spark_render::element(
        "box",
        vec![("on".into(), PropEntry::Cell(Rc::new(prop_cell.clone())))],
        vec![
            reactive_text(Rc::new(text_cell.clone())),
            signal_node(Rc::new(slot_cell.clone())),
        ],
    );
    let rendered = renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(slot_cell.listener_count(), 1);
    assert_eq!(text_cell.listener_count(), 1);
    assert_eq!(prop_cell.listener_count(), 1);

    renderer.unmount(&rendered);
    assert_eq!(slot_cell.listener_count(), 0);
    assert_eq!(text_cell.listener_count(), 0);
    assert_eq!(prop_cell.listener_count(), 0);
    assert_eq!(root.child_count(), 0);
}

#[test]
fn test_portal_inside_slot_unmounts_with_patch() {
    let (renderer, root) = setup();
    let overlay = renderer.strategy().create_element("overlay");
    let cell = ValueCell::new(Value::Node(portal(
        overlay.clone(),
        vec![text("floating")],
    )));
    let tree: Node = signal_node(Rc::new(cell.clone()));
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(overlay.text_content(), "floating");
    // The portal occupies nothing in the slot's own container.
    assert_eq!(root.text_content(), "");

    cell.set(Value::from("plain"));
    assert_eq!(overlay.child_count(), 0);
    assert_eq!(root.text_content(), "plain");
}

#[test]
fn test_patch_runs_after_mount_handle_dropped() {
    let (renderer, root) = setup();
    let cell = ValueCell::new(Value::from("a"));
    let tree: Node = signal_node(Rc::new(cell.clone()));
    // The embedder keeps nothing; the cell subscription owns the slot.
    drop(renderer.mount(&tree, &ContextEnv::new(), &root).unwrap());

    cell.set(Value::from("b"));
    assert_eq!(root.text_content(), "b");
    assert_eq!(cell.listener_count(), 1);
}

#[test]
fn test_patch_abandoned_when_marker_detached() {
    let (renderer, root) = setup();
    let cell = ValueCell::new(Value::from("held"));
    let tree: Node = signal_node(Rc::new(cell.clone()));
    let rendered = renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();

    // An external actor yanked the anchor out of the tree.
    let marker = rendered.marker().unwrap();
    renderer.strategy().remove_child(&root, &marker);

    // The patch cannot find an insertion point; old content stays put.
    cell.set(Value::from("lost"));
    assert_eq!(root.text_content(), "held");
}

#[test]
fn test_provider_bindings_reach_nested_slots() {
    let (renderer, root) = setup();
    let key = ContextKey::new("label");
    let cell = ValueCell::new(Value::from("first"));
    let tree: Node = provider(
        vec![(key.clone(), Rc::new(String::from("bound")) as ContextValue)],
        vec![signal_node(Rc::new(cell.clone()))],
    );
    let rendered = renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(root.text_content(), "first");

    cell.set(Value::from("second"));
    assert_eq!(root.text_content(), "second");
    renderer.unmount(&rendered);
    assert_eq!(root.child_count(), 0);
}
