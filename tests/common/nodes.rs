#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use stepgraph::control::Command;
use stepgraph::node::{Node, NodeContext, NodeError, NodeOutput};
use stepgraph::schema::MapState;
use stepgraph::types::NodeId;

/// Appends one item to the `messages` sequence.
#[derive(Debug, Clone)]
pub struct AppendNode {
    pub item: String,
}

impl AppendNode {
    pub fn new(item: impl Into<String>) -> Self {
        Self { item: item.into() }
    }
}

#[async_trait]
impl Node<MapState> for AppendNode {
    async fn run(
        &self,
        _state: MapState,
        _ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        let mut update = MapState::new();
        update.insert("messages", json!([self.item.clone()]));
        Ok(NodeOutput::Update(update))
    }
}

/// Contributes `1` to the `count` key.
#[derive(Debug, Clone)]
pub struct AddOneNode;

#[async_trait]
impl Node<MapState> for AddOneNode {
    async fn run(
        &self,
        _state: MapState,
        _ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        let mut update = MapState::new();
        update.insert("count", json!(1));
        Ok(NodeOutput::Update(update))
    }
}

/// Returns an empty update.
#[derive(Debug, Clone)]
pub struct NoopNode;

#[async_trait]
impl Node<MapState> for NoopNode {
    async fn run(
        &self,
        _state: MapState,
        _ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        Ok(NodeOutput::Update(MapState::new()))
    }
}

/// Returns its input state untouched, exercising the aliasing guard.
#[derive(Debug, Clone)]
pub struct EchoNode;

#[async_trait]
impl Node<MapState> for EchoNode {
    async fn run(
        &self,
        state: MapState,
        _ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        Ok(NodeOutput::Update(state))
    }
}

/// Always fails with the given message.
#[derive(Debug, Clone)]
pub struct FailNode {
    pub message: &'static str,
}

#[async_trait]
impl Node<MapState> for FailNode {
    async fn run(
        &self,
        _state: MapState,
        _ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        Err(NodeError::Other(self.message.to_string()))
    }
}

/// Fails `failures` times, then succeeds with an empty update.
#[derive(Debug, Default)]
pub struct FlakyNode {
    pub failures: u32,
    pub attempts: AtomicU32,
}

impl FlakyNode {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Node<MapState> for FlakyNode {
    async fn run(
        &self,
        _state: MapState,
        _ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            Err(NodeError::Other("temporary outage".to_string()))
        } else {
            Ok(NodeOutput::Update(MapState::new()))
        }
    }
}

/// Panics on execution.
#[derive(Debug, Clone)]
pub struct PanicNode;

#[async_trait]
impl Node<MapState> for PanicNode {
    async fn run(
        &self,
        _state: MapState,
        _ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        panic!("boom");
    }
}

/// Suspends with a question, then appends the resume answer.
#[derive(Debug, Clone)]
pub struct AskNode {
    pub question: &'static str,
}

#[async_trait]
impl Node<MapState> for AskNode {
    async fn run(
        &self,
        _state: MapState,
        ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        let answer = ctx.interrupt(json!(self.question))?;
        let mut update = MapState::new();
        update.insert("messages", json!([answer]));
        Ok(NodeOutput::Update(update))
    }
}

/// Returns a routing command, optionally with an update item.
#[derive(Debug, Clone)]
pub struct CommandNode {
    pub goto: Vec<String>,
    pub item: Option<String>,
}

#[async_trait]
impl Node<MapState> for CommandNode {
    async fn run(
        &self,
        _state: MapState,
        _ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        let mut command: Command<MapState> =
            Command::goto_all(self.goto.iter().map(|name| NodeId::from(name.as_str())));
        if let Some(item) = &self.item {
            let mut update = MapState::new();
            update.insert("messages", json!([item]));
            command = command.with_update(update);
        }
        Ok(NodeOutput::Command(command))
    }
}

/// Emits token events, for message-mode streaming tests.
#[derive(Debug, Clone)]
pub struct TokenNode {
    pub chunks: Vec<&'static str>,
}

#[async_trait]
impl Node<MapState> for TokenNode {
    async fn run(
        &self,
        _state: MapState,
        ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        ctx.emit_llm_start("test-model").await;
        for chunk in &self.chunks {
            ctx.emit_token(*chunk).await;
        }
        ctx.emit_llm_end("test-model").await;
        Ok(NodeOutput::Update(MapState::new()))
    }
}

/// Sleeps briefly each run; used with cyclic graphs for cancellation tests.
#[derive(Debug, Clone)]
pub struct SpinNode;

#[async_trait]
impl Node<MapState> for SpinNode {
    async fn run(
        &self,
        _state: MapState,
        _ctx: NodeContext<MapState>,
    ) -> Result<NodeOutput<MapState>, NodeError> {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        Ok(NodeOutput::Update(MapState::new()))
    }
}

/// Counter state for merger-based graphs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Counter {
    pub count: i64,
}

/// Adds one to the counter, state-in state-out.
#[derive(Debug, Clone)]
pub struct IncrementNode;

#[async_trait]
impl Node<Counter> for IncrementNode {
    async fn run(
        &self,
        state: Counter,
        _ctx: NodeContext<Counter>,
    ) -> Result<NodeOutput<Counter>, NodeError> {
        Ok(NodeOutput::Update(Counter {
            count: state.count + 1,
        }))
    }
}

/// A value used by several tests for custom payloads.
pub fn payload(value: &str) -> Value {
    json!(value)
}
