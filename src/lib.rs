//! # stepgraph: Stateful Graph Execution Engine
//!
//! stepgraph executes user-defined directed graphs of async nodes under a
//! superstep scheduler: every node in the current frontier runs in
//! parallel against the same state snapshot, the partial updates merge
//! deterministically through a caller-supplied schema, and the next
//! frontier is computed from static edges, conditional routers, and
//! in-node routing commands. The engine is generic over the state type and
//! interprets nothing of its contents.
//!
//! ## Core concepts
//!
//! - **Nodes**: async units of work returning a state update or a routing
//!   [`Command`](control::Command)
//! - **Schema**: per-key reducers (map states) or per-field rules (record
//!   states) deciding how concurrent updates combine
//! - **Superstep**: one frontier-to-frontier iteration of the executor
//! - **Interrupts**: pre-node, post-node, and in-node suspension points
//!   surfacing a typed [`GraphInterrupt`](runtime::GraphInterrupt) envelope
//! - **Checkpoints**: versioned per-thread snapshots enabling persistence,
//!   time travel, and external state edits between resumptions
//! - **Streaming**: lifecycle events bridged into bounded channels with
//!   mode filters and backpressure accounting
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::json;
//! use stepgraph::graph::GraphBuilder;
//! use stepgraph::node::{Node, NodeContext, NodeError, NodeOutput};
//! use stepgraph::schema::{Append, MapSchema, MapState};
//!
//! struct Greet;
//!
//! #[async_trait]
//! impl Node<MapState> for Greet {
//!     async fn run(
//!         &self,
//!         _state: MapState,
//!         _ctx: NodeContext<MapState>,
//!     ) -> Result<NodeOutput<MapState>, NodeError> {
//!         let mut update = MapState::new();
//!         update.insert("messages", json!(["hello"]));
//!         Ok(NodeOutput::Update(update))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let graph = GraphBuilder::new()
//!     .add_node("greet", "emits a greeting", Greet)
//!     .set_entry_point("greet")
//!     .add_edge("greet", "END")
//!     .set_schema(
//!         MapSchema::new()
//!             .with_initial(MapState::new().with("messages", json!([])))
//!             .with_reducer("messages", Arc::new(Append)),
//!     )
//!     .compile()
//!     .unwrap();
//!
//! let final_state = graph.invoke(MapState::new()).await.unwrap();
//! assert_eq!(final_state.get("messages"), Some(&json!(["hello"])));
//! # }
//! ```
//!
//! ## Module guide
//!
//! - [`graph`]: graph construction and compilation
//! - [`node`]: the [`Node`](node::Node) trait, context, and errors
//! - [`schema`]: state schemas, reducers, and field rules
//! - [`runtime`]: the superstep executor, run configuration, retries
//! - [`listener`]: node lifecycle listeners
//! - [`stream`]: event streaming with backpressure
//! - [`checkpoint`]: versioned per-thread persistence
//! - [`telemetry`]: tracing subscriber setup

pub mod checkpoint;
pub mod control;
pub mod graph;
pub mod listener;
pub mod node;
pub mod runtime;
pub mod schema;
pub mod stream;
pub mod telemetry;
pub mod types;
pub mod utils;
