//! Component resolution and context propagation, end to end.
//!
//! Components here exercise all four result shapes plus context injection:
//! providers bind values, components read them through their scope, and a
//! value that settles after mount patches under the context captured at
//! resolution time.

use std::cell::Cell;
use std::rc::Rc;

use spark_render::{
    component, deferred, fragment, provider, text, value_stream, AbstractNode, ComponentResult,
    ContextEnv, ContextKey, ContextValue, MemoryBackend, MemoryHandle, RenderError, RenderValue,
    Renderer, ValueCell,
};

type Node = AbstractNode<MemoryHandle>;
type Value = RenderValue<MemoryHandle>;

fn setup() -> (Renderer<MemoryBackend>, MemoryHandle) {
    let renderer = Renderer::new(MemoryBackend::new());
    let root = renderer.strategy().create_root();
    (renderer, root)
}

fn bind(key: &ContextKey, value: &str) -> (ContextKey, ContextValue) {
    (key.clone(), Rc::new(value.to_string()) as ContextValue)
}

/// A component that renders the string bound to `key` in its scope.
fn label_reader(key: ContextKey) -> Node {
    component(
        move |_, scope| {
            let label = scope
                .inject_as::<String>(&key)
                .map(|s| (*s).clone())
                .unwrap_or_else(|| "unbound".into());
            Ok(ComponentResult::Node(text(&label)))
        },
        vec![],
        vec![],
    )
}

// =============================================================================
// Synchronous components
// =============================================================================

#[test]
fn test_component_children_pass_through() {
    let (renderer, root) = setup();
    let tree: Node = component(
        |input, _| {
            let mut wrapped = vec![text("<<")];
            wrapped.extend(input.children.iter().cloned());
            wrapped.push(text(">>"));
            Ok(ComponentResult::Node(fragment(wrapped)))
        },
        vec![],
        vec![text("inner")],
    );
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(root.text_content(), "<<inner>>");
}

#[test]
fn test_component_error_unwinds_mount() {
    let (renderer, root) = setup();
    let tree: Node = fragment(vec![
        text("kept?"),
        component(
            |_, _| Err::<ComponentResult<MemoryHandle>, _>(RenderError::component("nope")),
            vec![],
            vec![],
        ),
    ]);
    let err = renderer.mount(&tree, &ContextEnv::new(), &root).unwrap_err();
    assert_eq!(err, RenderError::component("nope"));
    // The sibling mounted before the failure was rolled back too.
    assert_eq!(root.child_count(), 0);
}

// =============================================================================
// Context
// =============================================================================

#[test]
fn test_nearest_provider_wins() {
    let (renderer, root) = setup();
    let key = ContextKey::new("label");
    let tree: Node = provider(
        vec![bind(&key, "outer")],
        vec![
            label_reader(key.clone()),
            provider(vec![bind(&key, "inner")], vec![label_reader(key.clone())]),
            label_reader(key.clone()),
        ],
    );
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(root.text_content(), "outerinnerouter");
}

#[test]
fn test_unbound_key_injects_none() {
    let (renderer, root) = setup();
    let key = ContextKey::new("label");
    renderer
        .mount(&label_reader(key), &ContextEnv::new(), &root)
        .unwrap();
    assert_eq!(root.text_content(), "unbound");
}

#[test]
fn test_key_identity_not_label() {
    let (renderer, root) = setup();
    let bound = ContextKey::new("label");
    let same_label = ContextKey::new("label");
    let tree: Node = provider(
        vec![bind(&bound, "value")],
        vec![label_reader(same_label)],
    );
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    // A distinct key with an equal label is a different key.
    assert_eq!(root.text_content(), "unbound");
}

#[test]
fn test_deferred_patch_uses_captured_context() {
    let (renderer, root) = setup();
    let key = ContextKey::new("label");
    let (future, handle) = deferred::<Value>();
    let async_reader: Node = component(
        move |_, _| Ok(ComponentResult::Deferred(future.clone())),
        vec![],
        vec![],
    );
    let tree: Node = provider(vec![bind(&key, "captured")], vec![async_reader]);
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(root.text_content(), "");

    // The settled content itself reads context; it must see the bindings
    // from the component's resolution site.
    handle.resolve(Value::Node(label_reader(key)));
    assert_eq!(root.text_content(), "captured");
}

// =============================================================================
// Asynchronous components
// =============================================================================

#[test]
fn test_deferred_component_patches_exactly_once() {
    let (renderer, root) = setup();
    let (future, handle) = deferred::<Value>();
    let renders = Rc::new(Cell::new(0u32));
    let renders_inner = renders.clone();
    let tree: Node = component(
        move |_, _| {
            renders_inner.set(renders_inner.get() + 1);
            Ok(ComponentResult::Deferred(future.clone()))
        },
        vec![],
        vec![],
    );
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(renders.get(), 1);
    assert_eq!(root.text_content(), "");

    handle.resolve(Value::from("done"));
    assert_eq!(root.text_content(), "done");
    // Settling patched the slot; the component function did not re-run.
    assert_eq!(renders.get(), 1);
}

#[test]
fn test_stream_component_tracks_every_emission() {
    let (renderer, root) = setup();
    let (stream, handle) = value_stream::<Value>();
    let tree: Node = fragment(vec![
        text("["),
        component(
            move |_, _| Ok(ComponentResult::Stream(stream.clone())),
            vec![],
            vec![],
        ),
        text("]"),
    ]);
    renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(root.text_content(), "[]");

    handle.emit(Value::from("1"));
    assert_eq!(root.text_content(), "[1]");
    handle.emit(Value::from(vec!["2a", "2b"]));
    assert_eq!(root.text_content(), "[2a2b]");
    handle.finish();
    assert_eq!(root.text_content(), "[2a2b]");
}

#[test]
fn test_cell_component_is_a_live_slot() {
    let (renderer, root) = setup();
    let cell = ValueCell::new(Value::from("v1"));
    let cell_inner = cell.clone();
    let tree: Node = component(
        move |_, _| Ok(ComponentResult::Cell(Rc::new(cell_inner.clone()))),
        vec![],
        vec![],
    );
    let rendered = renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
    assert_eq!(root.text_content(), "v1");

    cell.set(Value::from("v2"));
    assert_eq!(root.text_content(), "v2");

    renderer.unmount(&rendered);
    assert_eq!(cell.listener_count(), 0);
}
