//! Fluent builder for workflow graphs.
//!
//! Accumulates nodes, edges, the entry point, the state schema, and the
//! retry policy, then [`compile`](GraphBuilder::compile)s into an
//! executable [`CompiledGraph`](crate::runtime::CompiledGraph).

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::edges::Router;
use crate::node::{Node, NodeEntry};
use crate::runtime::RetryPolicy;
use crate::schema::{StateMerger, StateSchema};
use crate::types::{GraphState, NodeId};

/// Builder for workflow graphs.
///
/// The builder is mutable until [`compile`](Self::compile); the compiled
/// graph is frozen for invocation (listeners excepted). Edges are appended
/// as given, never deduplicated; the executor deduplicates when it builds
/// a frontier.
///
/// # Required configuration
///
/// - at least one node registered via [`add_node`](Self::add_node);
/// - an entry point set via [`set_entry_point`](Self::set_entry_point);
/// - every node reached at runtime must have an applicable outgoing edge
///   (static, conditional, or provided by a
///   [`Command`](crate::control::Command)), or reach [`NodeId::End`].
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use stepgraph::graph::GraphBuilder;
/// use stepgraph::node::{Node, NodeContext, NodeError, NodeOutput};
/// use stepgraph::schema::MapState;
///
/// struct Worker;
///
/// #[async_trait]
/// impl Node<MapState> for Worker {
///     async fn run(
///         &self,
///         state: MapState,
///         _ctx: NodeContext<MapState>,
///     ) -> Result<NodeOutput<MapState>, NodeError> {
///         Ok(NodeOutput::Update(state))
///     }
/// }
///
/// let graph = GraphBuilder::new()
///     .add_node("worker", "does the work", Worker)
///     .set_entry_point("worker")
///     .add_edge("worker", "END")
///     .compile()
///     .unwrap();
/// ```
pub struct GraphBuilder<S> {
    pub(super) nodes: FxHashMap<NodeId, NodeEntry<S>>,
    pub(super) edges: FxHashMap<NodeId, Vec<NodeId>>,
    pub(super) routers: FxHashMap<NodeId, Router<S>>,
    pub(super) entry_point: Option<NodeId>,
    pub(super) schema: Option<Arc<dyn StateSchema<S>>>,
    pub(super) merger: Option<StateMerger<S>>,
    pub(super) retry_policy: RetryPolicy,
}

impl<S: GraphState> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: GraphState> GraphBuilder<S> {
    /// Creates a new, empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            routers: FxHashMap::default(),
            entry_point: None,
            schema: None,
            merger: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Register a node under a unique name.
    ///
    /// `description` is human-readable documentation surfaced through
    /// [`CompiledGraph::node_description`](crate::runtime::CompiledGraph::node_description).
    /// Attempts to register the reserved terminal name `"END"` are ignored
    /// with a warning; the terminal is virtual and never executed.
    #[must_use]
    pub fn add_node(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        node: impl Node<S> + 'static,
    ) -> Self {
        let id = NodeId::from(name.into());
        if id.is_end() {
            tracing::warn!("ignoring registration under the reserved terminal name END");
            return self;
        }
        self.nodes
            .insert(id, NodeEntry::new(Arc::new(node), description.into()));
        self
    }

    /// Add a static edge between two nodes.
    ///
    /// Multiple edges from the same node fan out; multiple edges to the
    /// same node fan in. `to` may be the terminal `"END"`.
    #[must_use]
    pub fn add_edge(mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        self.edges.entry(from.into()).or_default().push(to.into());
        self
    }

    /// Attach a conditional router to a node.
    ///
    /// At runtime the router supersedes the node's static edges and yields
    /// exactly one successor. Attaching a second router to the same node
    /// replaces the first.
    #[must_use]
    pub fn add_conditional_edge(mut self, from: impl Into<NodeId>, router: Router<S>) -> Self {
        self.routers.insert(from.into(), router);
        self
    }

    /// Set the node execution starts from.
    #[must_use]
    pub fn set_entry_point(mut self, name: impl Into<NodeId>) -> Self {
        self.entry_point = Some(name.into());
        self
    }

    /// Set the state schema driving merges and the initial state.
    #[must_use]
    pub fn set_schema(mut self, schema: impl StateSchema<S> + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Set a custom merger used when no schema is configured.
    ///
    /// The merger receives the state entering a superstep plus every node
    /// result of that superstep, in frontier order.
    #[must_use]
    pub fn set_state_merger(mut self, merger: StateMerger<S>) -> Self {
        self.merger = Some(merger);
        self
    }

    /// Set the retry policy applied to every node execution.
    #[must_use]
    pub fn set_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of static edges (counting duplicates).
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}
