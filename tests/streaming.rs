mod common;

use common::*;
use stepgraph::graph::GraphBuilder;
use stepgraph::listener::StreamEventKind;
use stepgraph::runtime::{CompiledGraph, RunConfig};
use stepgraph::schema::MapState;
use stepgraph::stream::{StreamMode, StreamOptions};

fn letter_graph() -> CompiledGraph<MapState> {
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
async fn updates_mode_streams_completions_and_chain_end() {
    let graph = letter_graph();
    let handle = graph.stream(messages_state(&[]));

    let mut kinds = Vec::new();
    while let Ok(event) = handle.events.recv_async().await {
        kinds.push(event.kind);
    }

    assert!(kinds.len() >= 3, "got {kinds:?}");
    assert!(kinds
        .iter()
        .all(|kind| matches!(kind, StreamEventKind::NodeComplete | StreamEventKind::ChainEnd)));
    assert_eq!(kinds.last(), Some(&StreamEventKind::ChainEnd));

    let final_state = handle.result.recv_async().await.unwrap();
    assert_eq!(messages_of(&final_state), vec!["A", "B"]);
    handle.done.recv_async().await.unwrap();
    assert!(handle.errors.recv_async().await.is_err());
}

#[tokio::test]
async fn debug_mode_streams_everything() {
    let graph = letter_graph();
    let handle = graph.stream_with_config(
        messages_state(&[]),
        RunConfig::default(),
        StreamOptions {
            mode: StreamMode::Debug,
            ..StreamOptions::default()
        },
    );

    let mut kinds = Vec::new();
    while let Ok(event) = handle.events.recv_async().await {
        kinds.push(event.kind);
    }

    assert!(kinds.contains(&StreamEventKind::ChainStart));
    assert!(kinds.contains(&StreamEventKind::NodeStart));
    assert!(kinds.contains(&StreamEventKind::NodeComplete));
    // The per-superstep report travels as a custom event.
    assert!(kinds.contains(&StreamEventKind::Custom));
    handle.done.recv_async().await.unwrap();
}

#[tokio::test]
async fn messages_mode_streams_only_llm_events() {
    let graph = GraphBuilder::new()
        .add_node(
            "talk",
            "emits tokens",
            TokenNode {
                chunks: vec!["he", "llo"],
            },
        )
        .set_entry_point("talk")
        .add_edge("talk", "END")
        .set_schema(append_schema())
        .compile()
        .unwrap();

    let handle = graph.stream_with_config(
        messages_state(&[]),
        RunConfig::default(),
        StreamOptions {
            mode: StreamMode::Messages,
            ..StreamOptions::default()
        },
    );

    let mut kinds = Vec::new();
    while let Ok(event) = handle.events.recv_async().await {
        kinds.push(event.kind);
    }

    assert_eq!(
        kinds,
        vec![
            StreamEventKind::LlmStart,
            StreamEventKind::Token,
            StreamEventKind::Token,
            StreamEventKind::LlmEnd,
        ]
    );
    handle.done.recv_async().await.unwrap();
}

#[tokio::test]
async fn errors_travel_on_the_errors_channel() {
    let graph = GraphBuilder::new()
        .add_node("bad", "fails", FailNode { message: "nope" })
        .set_entry_point("bad")
        .add_edge("bad", "END")
        .set_schema(append_schema())
        .compile()
        .unwrap();

    let handle = graph.stream(messages_state(&[]));

    let mut kinds = Vec::new();
    while let Ok(event) = handle.events.recv_async().await {
        kinds.push(event.kind);
    }
    // chain_end still streams on failure.
    assert_eq!(kinds.last(), Some(&StreamEventKind::ChainEnd));

    let err = handle.errors.recv_async().await.unwrap();
    assert!(err.to_string().contains("nope"));
    assert!(handle.result.recv_async().await.is_err());
    handle.done.recv_async().await.unwrap();
}

// With a zero-capacity channel and nobody consuming, every admitted event
// is dropped and counted.
#[tokio::test]
async fn zero_buffer_counts_drops() {
    let graph = letter_graph();
    let handle = graph.stream_with_config(
        messages_state(&[]),
        RunConfig::default(),
        StreamOptions {
            mode: StreamMode::Debug,
            buffer: 0,
            drop_when_full: true,
        },
    );

    handle.done.recv_async().await.unwrap();
    let dropped = handle.dropped_events();
    assert!(dropped > 0, "expected dropped events");
    // The counter never decreases.
    assert!(handle.dropped_events() >= dropped);
    assert!(handle.events.recv_async().await.is_err());
}

#[tokio::test]
async fn cancel_stops_the_stream() {
    let graph = GraphBuilder::new()
        .add_node("spin", "loops forever", SpinNode)
        .set_entry_point("spin")
        .add_edge("spin", "spin")
        .set_schema(append_schema())
        .compile()
        .unwrap();

    let handle = graph.stream(messages_state(&[]));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.cancel();

    let err = handle.errors.recv_async().await.unwrap();
    assert!(err.to_string().contains("cancelled"));
    handle.done.recv_async().await.unwrap();
}

#[tokio::test]
async fn interrupts_surface_on_the_errors_channel() {
    let graph = GraphBuilder::new()
        .add_node("ask", "asks", AskNode { question: "name?" })
        .set_entry_point("ask")
        .add_edge("ask", "END")
        .set_schema(append_schema())
        .compile()
        .unwrap();

    let handle = graph.stream(messages_state(&[]));
    let err = handle.errors.recv_async().await.unwrap();
    let interrupt = err.as_interrupt().expect("expected interrupt");
    assert_eq!(interrupt.interrupt_value, Some(serde_json::json!("name?")));
    handle.done.recv_async().await.unwrap();
}
