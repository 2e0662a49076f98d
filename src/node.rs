//! Node execution primitives: the [`Node`] trait, execution context, output
//! values, and error taxonomy.
//!
//! A node is a stateless async unit of work. It receives a snapshot of the
//! current state plus a [`NodeContext`] and returns either a state update or
//! a routing [`Command`](crate::control::Command). Any mutable data lives in
//! the state value; the node itself should hold only configuration.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;

use crate::control::Command;
use crate::listener::{EventFanout, StreamEvent, StreamEventKind};
use crate::types::{GraphState, NodeId};

/// Core trait for executable workflow nodes.
///
/// Nodes receive an owned clone of the current state and return the state
/// they want merged, or a [`Command`](crate::control::Command) when they
/// also want to steer routing. A node that needs to pause for external
/// input calls [`NodeContext::interrupt`].
///
/// # Design notes
///
/// - Nodes should be stateless and, where parallel siblings update the same
///   keys, their updates should commute under the schema's reducers.
/// - Fatal problems are reported by returning an error; the retry policy of
///   the graph decides whether the node is re-attempted.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use stepgraph::node::{Node, NodeContext, NodeError, NodeOutput};
/// use stepgraph::schema::MapState;
/// use serde_json::json;
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Node<MapState> for Greeter {
///     async fn run(
///         &self,
///         _state: MapState,
///         _ctx: NodeContext<MapState>,
///     ) -> Result<NodeOutput<MapState>, NodeError> {
///         let mut update = MapState::new();
///         update.insert("greeting", json!("hello"));
///         Ok(NodeOutput::Update(update))
///     }
/// }
/// ```
#[async_trait]
pub trait Node<S>: Send + Sync {
    /// Execute this node against a snapshot of the current state.
    async fn run(&self, state: S, ctx: NodeContext<S>) -> Result<NodeOutput<S>, NodeError>;
}

/// Result of a single node execution.
///
/// The two variants collapse the polymorphic node shapes (plain, routing,
/// interruptible) into one signature: a state update merged through the
/// schema, or a command carrying an optional update plus explicit routing.
#[derive(Clone, Debug)]
pub enum NodeOutput<S> {
    /// A state update merged by the graph's schema or merger.
    Update(S),
    /// A routing command; its destinations supersede the node's edges.
    Command(Command<S>),
}

impl<S> From<Command<S>> for NodeOutput<S> {
    fn from(command: Command<S>) -> Self {
        NodeOutput::Command(command)
    }
}

/// Registered node implementation plus its description.
pub struct NodeEntry<S> {
    pub(crate) node: Arc<dyn Node<S>>,
    pub(crate) description: String,
}

impl<S> Clone for NodeEntry<S> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            description: self.description.clone(),
        }
    }
}

impl<S> NodeEntry<S> {
    pub(crate) fn new(node: Arc<dyn Node<S>>, description: String) -> Self {
        Self { node, description }
    }

    /// Human-readable description supplied at registration time.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Single-use slot holding the resume value for a resumed invocation.
///
/// The first call to [`NodeContext::interrupt`] in a run takes the value;
/// later interrupts in the same run suspend again.
#[derive(Clone, Debug, Default)]
pub(crate) struct ResumeSlot {
    value: Arc<Mutex<Option<Value>>>,
}

impl ResumeSlot {
    pub(crate) fn new(value: Option<Value>) -> Self {
        Self {
            value: Arc::new(Mutex::new(value)),
        }
    }

    fn take(&self) -> Option<Value> {
        self.value.lock().take()
    }
}

/// Execution context handed to a node for one superstep.
///
/// Carries the node's identity, the current superstep number, the event
/// fan-out for lifecycle notifications, the resume slot, and the run's
/// cancellation signal. Cloning is cheap; all interesting fields are shared.
#[derive(Clone)]
pub struct NodeContext<S> {
    pub(crate) node: NodeId,
    pub(crate) step: u64,
    pub(crate) events: Arc<EventFanout<S>>,
    pub(crate) resume: ResumeSlot,
    pub(crate) cancellation: Option<watch::Receiver<bool>>,
}

impl<S: GraphState> NodeContext<S> {
    /// Identifier of the node this context was issued to.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Superstep number of the current iteration (1-based).
    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Suspend execution until the caller resumes with a value.
    ///
    /// When the run configuration carries a resume value (set by the caller
    /// on re-invocation) the value is returned immediately and the node
    /// continues. Otherwise the call raises an interrupt sentinel which the
    /// executor converts into a [`GraphInterrupt`](crate::runtime::GraphInterrupt)
    /// carrying `value` back to the caller.
    ///
    /// The resume value is consumed by the first interrupt of a run; a
    /// second interrupt in the same run suspends again.
    pub fn interrupt(&self, value: Value) -> Result<Value, NodeError> {
        match self.resume.take() {
            Some(resume) => Ok(resume),
            None => Err(NodeError::Interrupted(InterruptSignal { value })),
        }
    }

    /// Returns `true` once the run's cancellation signal has fired.
    ///
    /// Long-running nodes should poll this at convenient checkpoints; the
    /// executor never terminates a node forcibly.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Emit a progress event for this node.
    ///
    /// Listeners observe the event before this call returns.
    pub async fn emit_progress(&self, message: impl Into<String>) {
        self.emit(StreamEventKind::NodeProgress, json!(message.into()))
            .await;
    }

    /// Emit a tool-invocation start event.
    pub async fn emit_tool_start(&self, tool: impl Into<String>, input: Value) {
        self.emit(
            StreamEventKind::ToolStart,
            json!({"tool": tool.into(), "input": input}),
        )
        .await;
    }

    /// Emit a tool-invocation end event.
    pub async fn emit_tool_end(&self, tool: impl Into<String>, output: Value) {
        self.emit(
            StreamEventKind::ToolEnd,
            json!({"tool": tool.into(), "output": output}),
        )
        .await;
    }

    /// Emit an LLM call start event.
    pub async fn emit_llm_start(&self, model: impl Into<String>) {
        self.emit(StreamEventKind::LlmStart, json!({"model": model.into()}))
            .await;
    }

    /// Emit an LLM call end event.
    pub async fn emit_llm_end(&self, model: impl Into<String>) {
        self.emit(StreamEventKind::LlmEnd, json!({"model": model.into()}))
            .await;
    }

    /// Emit a single streamed token chunk.
    pub async fn emit_token(&self, chunk: impl Into<String>) {
        self.emit(StreamEventKind::Token, json!(chunk.into())).await;
    }

    /// Emit a custom event with a caller-chosen scope and payload.
    pub async fn emit_custom(&self, scope: impl Into<String>, payload: Value) {
        self.emit(
            StreamEventKind::Custom,
            json!({"scope": scope.into(), "payload": payload}),
        )
        .await;
    }

    async fn emit(&self, kind: StreamEventKind, payload: Value) {
        let mut metadata = FxHashMap::default();
        metadata.insert("step".to_string(), json!(self.step));
        metadata.insert("payload".to_string(), payload);
        self.events
            .notify(StreamEvent::for_node(self.node.clone(), kind, metadata))
            .await;
    }
}

/// Payload of a dynamic interrupt raised inside a node.
///
/// Not constructed directly; produced by [`NodeContext::interrupt`] and
/// intercepted by the executor.
#[derive(Clone, Debug)]
pub struct InterruptSignal {
    /// The value the node surfaced to the caller (a question, a form, ...).
    pub value: Value,
}

/// Errors returned by node execution.
///
/// Errors other than [`Interrupted`](Self::Interrupted) are subject to the
/// graph's retry policy; the final failure aborts the invocation wrapped
/// with the node's name. `Interrupted` is a control-flow sentinel the
/// executor converts into a typed suspension envelope.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(stepgraph::node::missing_input),
        help("Check that an upstream node produced the required data: {what}.")
    )]
    MissingInput { what: &'static str },

    /// External provider or service failure.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(stepgraph::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization failure inside a node.
    #[error(transparent)]
    #[diagnostic(code(stepgraph::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(
        code(stepgraph::node::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    /// Free-form node failure.
    #[error("{0}")]
    #[diagnostic(code(stepgraph::node::other))]
    Other(String),

    /// Dynamic interrupt sentinel raised by [`NodeContext::interrupt`].
    ///
    /// Never retried; the executor intercepts it before error handling.
    #[error("node interrupted")]
    #[diagnostic(code(stepgraph::node::interrupted))]
    Interrupted(InterruptSignal),
}

impl NodeError {
    /// Returns `true` for the dynamic-interrupt sentinel.
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, NodeError::Interrupted(_))
    }
}
