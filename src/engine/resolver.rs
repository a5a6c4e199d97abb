//! Component resolution - turning a component invocation into one mountable
//! abstract node.
//!
//! Synchronous results pass straight through. Asynchronous results (deferred,
//! stream) are normalized into a signal slot over an engine-owned cell seeded
//! with the empty value: the slot mounts its empty placeholder immediately,
//! and every later arrival flows through the ordinary patch path. The mount
//! walk itself never blocks and never special-cases async components.

use std::rc::Rc;

use crate::cell::{StreamEvent, ValueCell};
use crate::context::ContextEnv;
use crate::node::{
    AbstractNode, ComponentFn, ComponentProps, ComponentResult, ComponentScope, PropMap,
    RenderValue,
};
use crate::types::RenderError;

use super::boundary::{fallback_guard_active, suspense_tracker_from};

/// Invoke `func` and classify its result into a single abstract node.
///
/// The context active at the invocation site is captured into any signal
/// slot produced here, so a later settle patches under the bindings the
/// component resolved with, not whatever is active when the value arrives.
pub fn resolve_component<H: Clone + 'static>(
    func: &ComponentFn<H>,
    props: PropMap<H>,
    children: Vec<AbstractNode<H>>,
    ctx: &ContextEnv,
) -> Result<AbstractNode<H>, RenderError> {
    let scope = ComponentScope::new(ctx.clone());
    let input = ComponentProps { props, children };

    match func(&input, &scope)? {
        ComponentResult::Node(node) => Ok(node),

        ComponentResult::Cell(cell) => Ok(AbstractNode::Signal {
            cell,
            captured: Some(ctx.clone()),
        }),

        ComponentResult::Deferred(deferred) => {
            // Suspense fallbacks must resolve synchronously.
            if fallback_guard_active(ctx) {
                return Err(RenderError::DeferredFallback);
            }

            let cell = ValueCell::new(RenderValue::Empty);
            let registration = suspense_tracker_from(ctx).map(|tracker| {
                let id = tracker.register();
                (tracker, id)
            });

            let resolve_cell = cell.clone();
            let resolve_reg = registration.clone();
            deferred.on_settle(
                move |value| {
                    resolve_cell.set(value);
                    if let Some((tracker, id)) = resolve_reg {
                        tracker.settle(id);
                    }
                },
                move |err| {
                    // Last mounted content (or the empty placeholder) stays.
                    tracing::warn!(error = %err, "deferred component rejected");
                    if let Some((tracker, id)) = registration {
                        tracker.settle(id);
                    }
                },
            );

            Ok(AbstractNode::Signal {
                cell: Rc::new(cell),
                captured: Some(ctx.clone()),
            })
        }

        ComponentResult::Stream(stream) => {
            if fallback_guard_active(ctx) {
                return Err(RenderError::DeferredFallback);
            }

            // Streams never hold a suspense boundary open.
            let cell = ValueCell::new(RenderValue::Empty);
            let sink = cell.clone();
            stream.listen(move |event| match event {
                StreamEvent::Value(value) => sink.set(value),
                StreamEvent::Failed(err) => {
                    tracing::warn!(error = %err, "component stream failed");
                }
                StreamEvent::Finished => {}
            });

            Ok(AbstractNode::Signal {
                cell: Rc::new(cell),
                captured: Some(ctx.clone()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryHandle};
    use crate::cell::{deferred, value_stream};
    use crate::engine::Renderer;
    use crate::node;

    type Node = AbstractNode<MemoryHandle>;
    type Value = RenderValue<MemoryHandle>;

    fn setup() -> (Renderer<MemoryBackend>, MemoryHandle) {
        let renderer = Renderer::new(MemoryBackend::new());
        let root = renderer.strategy().create_root();
        (renderer, root)
    }

    #[test]
    fn test_node_result_passes_through() {
        let tree: Node = node::component(
            |_, _| Ok(ComponentResult::Node(node::text("plain"))),
            vec![],
            vec![],
        );
        let (renderer, root) = setup();
        renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
        assert_eq!(root.text_content(), "plain");
    }

    #[test]
    fn test_component_error_propagates() {
        let tree: Node = node::component(
            |_, _| Err::<ComponentResult<MemoryHandle>, _>(RenderError::component("broke")),
            vec![],
            vec![],
        );
        let (renderer, root) = setup();
        let err = renderer.mount(&tree, &ContextEnv::new(), &root).unwrap_err();
        assert_eq!(err, RenderError::component("broke"));
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn test_deferred_result_mounts_placeholder_then_patches_once() {
        let (future, handle) = deferred::<Value>();
        let tree: Node = node::component(
            move |_, _| Ok(ComponentResult::Deferred(future.clone())),
            vec![],
            vec![],
        );
        let (renderer, root) = setup();
        renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();

        // Marker plus the empty placeholder.
        assert_eq!(root.child_count(), 2);
        assert_eq!(root.text_content(), "");

        handle.resolve(Value::from("late"));
        assert_eq!(root.text_content(), "late");

        // Second settle is a no-op.
        handle.resolve(Value::from("ignored"));
        assert_eq!(root.text_content(), "late");
    }

    #[test]
    fn test_rejected_deferred_keeps_placeholder() {
        let (future, handle) = deferred::<Value>();
        let tree: Node = node::component(
            move |_, _| Ok(ComponentResult::Deferred(future.clone())),
            vec![],
            vec![],
        );
        let (renderer, root) = setup();
        renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();

        handle.reject(RenderError::component("load failed"));
        assert_eq!(root.text_content(), "");
        // A late resolve after rejection changes nothing.
        handle.resolve(Value::from("too late"));
        assert_eq!(root.text_content(), "");
    }

    #[test]
    fn test_stream_result_last_write_wins() {
        let (stream, handle) = value_stream::<Value>();
        handle.emit(Value::from("first"));
        let tree: Node = node::component(
            move |_, _| Ok(ComponentResult::Stream(stream.clone())),
            vec![],
            vec![],
        );
        let (renderer, root) = setup();
        renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();

        // Pre-attach value replayed at mount.
        assert_eq!(root.text_content(), "first");
        handle.emit(Value::from("second"));
        assert_eq!(root.text_content(), "second");

        handle.finish();
        handle.emit(Value::from("after-finish"));
        assert_eq!(root.text_content(), "second");
    }

    #[test]
    fn test_stream_failure_keeps_last_content() {
        let (stream, handle) = value_stream::<Value>();
        let tree: Node = node::component(
            move |_, _| Ok(ComponentResult::Stream(stream.clone())),
            vec![],
            vec![],
        );
        let (renderer, root) = setup();
        renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();

        handle.emit(Value::from("shown"));
        handle.fail(RenderError::stream_failed("pipe closed"));
        assert_eq!(root.text_content(), "shown");
    }

    #[test]
    fn test_cell_result_patches_like_signal() {
        let cell = ValueCell::new(Value::from("a"));
        let cell_for_component = cell.clone();
        let tree: Node = node::component(
            move |_, _| {
                Ok(ComponentResult::Cell(Rc::new(cell_for_component.clone())))
            },
            vec![],
            vec![],
        );
        let (renderer, root) = setup();
        renderer.mount(&tree, &ContextEnv::new(), &root).unwrap();
        assert_eq!(root.text_content(), "a");

        cell.set(Value::from("b"));
        assert_eq!(root.text_content(), "b");
    }
}
