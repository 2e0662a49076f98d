//! Lifecycle event types observed by listeners and stream consumers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::NodeId;

/// Kind discriminator for lifecycle events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    /// Invocation started.
    ChainStart,
    /// Invocation finished (successfully or with an error).
    ChainEnd,
    /// A node is about to execute.
    NodeStart,
    /// In-node progress report.
    NodeProgress,
    /// A node finished and produced an update.
    NodeComplete,
    /// A node failed.
    NodeError,
    /// A tool invocation began inside a node.
    ToolStart,
    /// A tool invocation finished inside a node.
    ToolEnd,
    /// An LLM call began inside a node.
    LlmStart,
    /// An LLM call finished inside a node.
    LlmEnd,
    /// A streamed LLM token chunk.
    Token,
    /// Caller-defined event.
    Custom,
}

impl StreamEventKind {
    /// Returns `true` for LLM-related kinds (`llm_start`, `llm_end`, `token`).
    #[must_use]
    pub fn is_llm(&self) -> bool {
        matches!(self, Self::LlmStart | Self::LlmEnd | Self::Token)
    }
}

impl fmt::Display for StreamEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ChainStart => "chain_start",
            Self::ChainEnd => "chain_end",
            Self::NodeStart => "node_start",
            Self::NodeProgress => "node_progress",
            Self::NodeComplete => "node_complete",
            Self::NodeError => "node_error",
            Self::ToolStart => "tool_start",
            Self::ToolEnd => "tool_end",
            Self::LlmStart => "llm_start",
            Self::LlmEnd => "llm_end",
            Self::Token => "token",
            Self::Custom => "custom",
        };
        write!(f, "{label}")
    }
}

/// A single lifecycle event.
///
/// `node` is `None` for chain-level events. `state` carries the node's
/// update on `node_complete` and the final state on `chain_end`; in-node
/// emissions (progress, tool, LLM) leave it empty. `metadata` is an opaque
/// map; the executor records the superstep number under `"step"` and
/// context emissions place their payload under `"payload"`.
#[derive(Clone, Debug)]
pub struct StreamEvent<S> {
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// The node the event concerns, if any.
    pub node: Option<NodeId>,
    /// Event kind.
    pub kind: StreamEventKind,
    /// State payload, where the kind carries one.
    pub state: Option<S>,
    /// Rendered error, for `node_error` and failed `chain_end`.
    pub error: Option<String>,
    /// Opaque event metadata.
    pub metadata: FxHashMap<String, Value>,
    /// Wall-clock duration of the observed work, where applicable.
    pub duration: Option<Duration>,
}

impl<S> StreamEvent<S> {
    fn new(node: Option<NodeId>, kind: StreamEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            node,
            kind,
            state: None,
            error: None,
            metadata: FxHashMap::default(),
            duration: None,
        }
    }

    /// Event attributed to a node, with metadata attached.
    #[must_use]
    pub fn for_node(
        node: NodeId,
        kind: StreamEventKind,
        metadata: FxHashMap<String, Value>,
    ) -> Self {
        let mut event = Self::new(Some(node), kind);
        event.metadata = metadata;
        event
    }

    /// `chain_start` carrying the initial state.
    #[must_use]
    pub fn chain_start(state: S, metadata: FxHashMap<String, Value>) -> Self {
        let mut event = Self::new(None, StreamEventKind::ChainStart);
        event.state = Some(state);
        event.metadata = metadata;
        event
    }

    /// `chain_end` carrying the final state and/or the rendered error.
    #[must_use]
    pub fn chain_end(state: Option<S>, error: Option<String>) -> Self {
        let mut event = Self::new(None, StreamEventKind::ChainEnd);
        event.state = state;
        event.error = error;
        event
    }

    /// `node_start` carrying the state handed to the node.
    #[must_use]
    pub fn node_start(node: NodeId, step: u64, state: S) -> Self {
        let mut event = Self::new(Some(node), StreamEventKind::NodeStart);
        event.state = Some(state);
        event
            .metadata
            .insert("step".to_string(), serde_json::json!(step));
        event
    }

    /// `node_complete` carrying the node's update and run duration.
    #[must_use]
    pub fn node_complete(node: NodeId, step: u64, update: Option<S>, duration: Duration) -> Self {
        let mut event = Self::new(Some(node), StreamEventKind::NodeComplete);
        event.state = update;
        event.duration = Some(duration);
        event
            .metadata
            .insert("step".to_string(), serde_json::json!(step));
        event
    }

    /// `node_error` carrying the rendered failure.
    #[must_use]
    pub fn node_error(node: NodeId, step: u64, error: String, duration: Duration) -> Self {
        let mut event = Self::new(Some(node), StreamEventKind::NodeError);
        event.error = Some(error);
        event.duration = Some(duration);
        event
            .metadata
            .insert("step".to_string(), serde_json::json!(step));
        event
    }
}
