mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use parking_lot::Mutex;
use stepgraph::graph::GraphBuilder;
use stepgraph::listener::{Listener, StreamEvent, StreamEventKind};
use stepgraph::runtime::{CompiledGraph, RunConfig};
use stepgraph::schema::MapState;
use stepgraph::types::NodeId;

/// Records every observed `(kind, node)` pair in arrival order.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(StreamEventKind, Option<NodeId>)>>,
}

impl Recorder {
    fn snapshot(&self) -> Vec<(StreamEventKind, Option<NodeId>)> {
        self.seen.lock().clone()
    }

    fn kinds(&self) -> Vec<StreamEventKind> {
        self.snapshot().into_iter().map(|(kind, _)| kind).collect()
    }
}

#[async_trait]
impl Listener<MapState> for Recorder {
    async fn on_event(&self, event: StreamEvent<MapState>) {
        self.seen.lock().push((event.kind, event.node));
    }
}

/// Panics on every event.
struct PanickyListener;

#[async_trait]
impl Listener<MapState> for PanickyListener {
    async fn on_event(&self, _event: StreamEvent<MapState>) {
        panic!("listener bug");
    }
}

fn two_node_graph() -> CompiledGraph<MapState> {
    GraphBuilder::new()
        .add_node("a", "first", AppendNode::new("A"))
        .add_node("b", "second", AppendNode::new("B"))
        .set_entry_point("a")
        .add_edge("a", "b")
        .add_edge("b", "END")
        .set_schema(append_schema())
        .compile()
        .unwrap()
}

#[tokio::test]
async fn global_listener_sees_ordered_lifecycle() {
    let graph = two_node_graph();
    let recorder = Arc::new(Recorder::default());
    graph.add_listener(recorder.clone());

    graph.invoke(messages_state(&[])).await.unwrap();

    let kinds = recorder.kinds();
    assert_eq!(kinds.first(), Some(&StreamEventKind::ChainStart));
    assert_eq!(kinds.last(), Some(&StreamEventKind::ChainEnd));

    // start strictly precedes complete for each node.
    let seen = recorder.snapshot();
    for node in ["a", "b"] {
        let id = NodeId::named(node);
        let start = seen
            .iter()
            .position(|(kind, n)| *kind == StreamEventKind::NodeStart && n.as_ref() == Some(&id))
            .unwrap();
        let complete = seen
            .iter()
            .position(|(kind, n)| *kind == StreamEventKind::NodeComplete && n.as_ref() == Some(&id))
            .unwrap();
        assert!(start < complete, "start after complete for {node}");
    }
}

#[tokio::test]
async fn node_error_event_is_emitted() {
    let graph = GraphBuilder::new()
        .add_node("bad", "fails", FailNode { message: "nope" })
        .set_entry_point("bad")
        .add_edge("bad", "END")
        .set_schema(append_schema())
        .compile()
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    graph.add_listener(recorder.clone());

    let _ = graph.invoke(messages_state(&[])).await;

    assert!(recorder
        .kinds()
        .contains(&StreamEventKind::NodeError));
}

#[tokio::test]
async fn per_node_listener_scopes_to_its_node() {
    let graph = two_node_graph();
    let recorder = Arc::new(Recorder::default());
    graph.add_node_listener("b", recorder.clone());

    graph.invoke(messages_state(&[])).await.unwrap();

    let seen = recorder.snapshot();
    assert!(!seen.is_empty());
    for (_, node) in seen {
        assert_eq!(node, Some(NodeId::named("b")));
    }
}

#[tokio::test]
async fn removed_listener_observes_nothing() {
    let graph = two_node_graph();
    let recorder = Arc::new(Recorder::default());
    let id = graph.add_listener(recorder.clone());
    assert!(graph.remove_listener(&id));
    assert!(!graph.remove_listener(&id));

    graph.invoke(messages_state(&[])).await.unwrap();
    assert!(recorder.snapshot().is_empty());
}

#[tokio::test]
async fn remove_by_reference_drops_every_registration() {
    let graph = two_node_graph();
    let recorder: Arc<dyn Listener<MapState>> = Arc::new(Recorder::default());
    graph.add_listener(recorder.clone());
    graph.add_node_listener("a", recorder.clone());

    assert_eq!(graph.listeners().remove_by_ref(&recorder), 2);
    assert!(graph.listeners().is_empty());
}

#[tokio::test]
async fn listener_panic_does_not_break_the_run() {
    let graph = two_node_graph();
    graph.add_listener(Arc::new(PanickyListener));
    let recorder = Arc::new(Recorder::default());
    graph.add_listener(recorder.clone());

    let final_state = graph.invoke(messages_state(&[])).await.unwrap();
    assert_eq!(messages_of(&final_state), vec!["A", "B"]);
    // The well-behaved listener still observed the run.
    assert!(!recorder.snapshot().is_empty());
}

#[tokio::test]
async fn config_callbacks_receive_events() {
    let graph = two_node_graph();
    let recorder = Arc::new(Recorder::default());

    let config = RunConfig::new().with_callback(recorder.clone());
    graph
        .invoke_with_config(messages_state(&[]), config)
        .await
        .unwrap();

    assert!(recorder.kinds().contains(&StreamEventKind::NodeComplete));
}

#[tokio::test]
async fn progress_events_reach_listeners() {
    #[derive(Debug, Clone)]
    struct Chatty;

    #[async_trait]
    impl stepgraph::node::Node<MapState> for Chatty {
        async fn run(
            &self,
            _state: MapState,
            ctx: stepgraph::node::NodeContext<MapState>,
        ) -> Result<stepgraph::node::NodeOutput<MapState>, stepgraph::node::NodeError> {
            ctx.emit_progress("halfway").await;
            Ok(stepgraph::node::NodeOutput::Update(MapState::new()))
        }
    }

    let graph = GraphBuilder::new()
        .add_node("chatty", "reports progress", Chatty)
        .set_entry_point("chatty")
        .add_edge("chatty", "END")
        .set_schema(append_schema())
        .compile()
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    graph.add_listener(recorder.clone());

    graph.invoke(MapState::new()).await.unwrap();

    let seen = recorder.snapshot();
    let progress = seen
        .iter()
        .find(|(kind, _)| *kind == StreamEventKind::NodeProgress)
        .expect("progress event missing");
    assert_eq!(progress.1, Some(NodeId::named("chatty")));
}
