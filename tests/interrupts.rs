mod common;

use common::*;
use serde_json::json;
use stepgraph::graph::GraphBuilder;
use stepgraph::runtime::{CompiledGraph, ExecutorError, RunConfig};
use stepgraph::schema::MapState;
use stepgraph::types::NodeId;

fn letter_chain() -> CompiledGraph<MapState> {
    GraphBuilder::new()
        .add_node("a", "appends A", AppendNode::new("A"))
        .add_node("b", "appends B", AppendNode::new("B"))
        .add_node("c", "appends C", AppendNode::new("C"))
        .set_entry_point("a")
        .add_edge("a", "b")
        .add_edge("b", "c")
        .add_edge("c", "END")
        .set_schema(append_schema())
        .compile()
        .unwrap()
}

// Interrupt before a node, then resume from it with a fresh configuration.
#[tokio::test]
async fn interrupt_before_pauses_and_resumes() {
    let graph = letter_chain();

    let config = RunConfig::new().with_interrupt_before(["b"]);
    let err = graph
        .invoke_with_config(messages_state(&["start"]), config)
        .await
        .err()
        .unwrap();

    let interrupt = err.as_interrupt().expect("expected an interrupt");
    assert_eq!(interrupt.node, NodeId::named("b"));
    assert_eq!(interrupt.next_nodes, vec![NodeId::named("b")]);
    assert_eq!(messages_of(&interrupt.state), vec!["start", "A"]);
    assert!(interrupt.interrupt_value.is_none());

    // No further node executed past the pause point.
    let resume = RunConfig::new().with_resume(interrupt.next_nodes.clone(), None);
    let final_state = graph
        .invoke_with_config(interrupt.state.clone(), resume)
        .await
        .unwrap();
    assert_eq!(messages_of(&final_state), vec!["start", "A", "B", "C"]);
}

#[tokio::test]
async fn interrupt_after_reports_computed_frontier() {
    let graph = letter_chain();

    let config = RunConfig::new().with_interrupt_after(["a"]);
    let err = graph
        .invoke_with_config(messages_state(&["start"]), config)
        .await
        .err()
        .unwrap();

    let interrupt = err.as_interrupt().expect("expected an interrupt");
    assert_eq!(interrupt.node, NodeId::named("a"));
    assert_eq!(interrupt.next_nodes, vec![NodeId::named("b")]);
    assert_eq!(messages_of(&interrupt.state), vec!["start", "A"]);
}

// A node calling the interrupt primitive suspends the run; resuming with a
// value hands it to the pending call.
#[tokio::test]
async fn dynamic_interrupt_suspends_and_resumes_with_value() {
    let graph = GraphBuilder::new()
        .add_node("ask", "asks for a name", AskNode { question: "What is your name?" })
        .set_entry_point("ask")
        .add_edge("ask", "END")
        .set_schema(append_schema())
        .compile()
        .unwrap();

    let err = graph.invoke(messages_state(&[])).await.err().unwrap();
    let interrupt = match err {
        ExecutorError::Interrupted(interrupt) => interrupt,
        other => panic!("expected interrupt, got {other:?}"),
    };
    assert_eq!(interrupt.node, NodeId::named("ask"));
    assert_eq!(interrupt.next_nodes, vec![NodeId::named("ask")]);
    assert_eq!(interrupt.interrupt_value, Some(json!("What is your name?")));

    let resume = RunConfig::new().with_resume(interrupt.next_nodes.clone(), Some(json!("Alice")));
    let final_state = graph
        .invoke_with_config(interrupt.state, resume)
        .await
        .unwrap();
    assert_eq!(messages_of(&final_state), vec!["Alice"]);
}

// The resume value feeds only the first interrupt of a run; a second
// interrupt suspends again.
#[tokio::test]
async fn second_interrupt_suspends_again() {
    let graph = GraphBuilder::new()
        .add_node("first", "asks first", AskNode { question: "first?" })
        .add_node("second", "asks second", AskNode { question: "second?" })
        .set_entry_point("first")
        .add_edge("first", "second")
        .add_edge("second", "END")
        .set_schema(append_schema())
        .compile()
        .unwrap();

    let err = graph.invoke(messages_state(&[])).await.err().unwrap();
    let first = err.into_interrupt().unwrap();
    assert_eq!(first.interrupt_value, Some(json!("first?")));

    let resume = RunConfig::new().with_resume(first.next_nodes.clone(), Some(json!("one")));
    let err = graph
        .invoke_with_config(first.state, resume)
        .await
        .err()
        .unwrap();
    let second = err.into_interrupt().unwrap();
    assert_eq!(second.node, NodeId::named("second"));
    assert_eq!(second.interrupt_value, Some(json!("second?")));
    assert_eq!(messages_of(&second.state), vec!["one"]);
}

// Interrupts win over sibling failures within the same superstep.
#[tokio::test]
async fn dynamic_interrupt_takes_precedence_over_errors() {
    let graph = GraphBuilder::new()
        .add_node("fan", "entry", NoopNode)
        .add_node("ask", "asks", AskNode { question: "go on?" })
        .add_node("bad", "fails", FailNode { message: "broken" })
        .set_entry_point("fan")
        .add_edge("fan", "ask")
        .add_edge("fan", "bad")
        .add_edge("ask", "END")
        .add_edge("bad", "END")
        .set_schema(append_schema())
        .compile()
        .unwrap();

    let err = graph.invoke(messages_state(&[])).await.err().unwrap();
    assert!(err.is_interrupt(), "expected interrupt, got {err:?}");
}
