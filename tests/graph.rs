mod common;

use std::sync::Arc;

use common::*;
use stepgraph::graph::{GraphBuilder, GraphError, Router};
use stepgraph::schema::MapState;
use stepgraph::types::NodeId;

#[test]
fn compile_requires_entry_point() {
    let err = GraphBuilder::<MapState>::new()
        .add_node("a", "first", NoopNode)
        .compile()
        .err()
        .unwrap();
    assert!(matches!(err, GraphError::MissingEntryPoint));
}

#[test]
fn compile_rejects_unregistered_entry_point() {
    let err = GraphBuilder::<MapState>::new()
        .add_node("a", "first", NoopNode)
        .set_entry_point("ghost")
        .compile()
        .err()
        .unwrap();
    match err {
        GraphError::UnknownNode { name, .. } => assert_eq!(name, "ghost"),
        other => panic!("expected UnknownNode, got {other:?}"),
    }
}

#[test]
fn compile_rejects_unregistered_edge_target() {
    let err = GraphBuilder::<MapState>::new()
        .add_node("a", "first", NoopNode)
        .set_entry_point("a")
        .add_edge("a", "missing")
        .compile()
        .err()
        .unwrap();
    assert!(matches!(err, GraphError::UnknownNode { .. }));
}

#[test]
fn compile_rejects_edge_from_terminal() {
    let err = GraphBuilder::<MapState>::new()
        .add_node("a", "first", NoopNode)
        .set_entry_point("a")
        .add_edge("END", "a")
        .compile()
        .err()
        .unwrap();
    assert!(matches!(err, GraphError::EdgeFromEnd));
}

#[test]
fn compile_rejects_unregistered_router_source() {
    let router: Router<MapState> = Arc::new(|_state| NodeId::End);
    let err = GraphBuilder::<MapState>::new()
        .add_node("a", "first", NoopNode)
        .set_entry_point("a")
        .add_edge("a", "END")
        .add_conditional_edge("ghost", router)
        .compile()
        .err()
        .unwrap();
    assert!(matches!(err, GraphError::UnknownNode { .. }));
}

#[test]
fn terminal_name_is_not_registrable() {
    let builder = GraphBuilder::<MapState>::new()
        .add_node("END", "never stored", NoopNode)
        .add_node("a", "first", NoopNode);
    assert_eq!(builder.node_count(), 1);
}

#[test]
fn edges_are_appended_not_deduplicated() {
    let builder = GraphBuilder::<MapState>::new()
        .add_node("a", "first", NoopNode)
        .add_edge("a", "END")
        .add_edge("a", "END");
    assert_eq!(builder.edge_count(), 2);
}

#[test]
fn compiled_graph_exposes_descriptions_and_entry() {
    let graph = GraphBuilder::<MapState>::new()
        .add_node("a", "the first worker", NoopNode)
        .set_entry_point("a")
        .add_edge("a", "END")
        .compile()
        .unwrap();
    assert_eq!(graph.entry_point(), &NodeId::named("a"));
    assert_eq!(graph.node_description("a"), Some("the first worker"));
    assert_eq!(graph.node_description("missing"), None);
    assert_eq!(graph.edges().get(&NodeId::named("a")).unwrap().len(), 1);
}
