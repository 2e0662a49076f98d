//! The compiled graph executor: a superstep scheduler over the frontier.
//!
//! One loop iteration is a *superstep*: every node in the frontier runs
//! concurrently against the same state snapshot, the results are merged
//! deterministically (schema fold, custom merger, or last-write-wins), and
//! the next frontier is computed from commands, conditional routers, and
//! static edges, in that priority order.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tracing::instrument;

use crate::control::Command;
use crate::graph::Router;
use crate::listener::{EventFanout, Listener, ListenerHub, ListenerId, StreamEvent, StreamEventKind};
use crate::node::{Node, NodeContext, NodeEntry, NodeError, NodeOutput, ResumeSlot};
use crate::runtime::config::RunConfig;
use crate::runtime::retry::RetryPolicy;
use crate::schema::{SchemaError, StateMerger, StateSchema};
use crate::types::{GraphState, NodeId};

/// Typed suspension envelope surfaced when execution pauses.
///
/// This is the one error callers must branch on: it is not a failure but a
/// controlled stop carrying the state at the moment of interruption, the
/// frontier to resume from, and, for dynamic interrupts, the value the
/// node surfaced.
#[derive(Clone, Debug)]
pub struct GraphInterrupt<S> {
    /// The node the interrupt is attributed to.
    pub node: NodeId,
    /// State at the moment of interruption.
    pub state: S,
    /// Frontier to resume from.
    pub next_nodes: Vec<NodeId>,
    /// Value passed to the in-node interrupt primitive, when dynamic.
    pub interrupt_value: Option<Value>,
}

impl<S> fmt::Display for GraphInterrupt<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph interrupted at node {}", self.node)
    }
}

impl<S: fmt::Debug> std::error::Error for GraphInterrupt<S> {}

/// Errors surfaced by graph invocation.
///
/// [`Interrupted`](Self::Interrupted) is a controlled suspension, not a
/// failure; match it via [`as_interrupt`](Self::as_interrupt). Everything
/// else aborts the invocation.
#[derive(Debug)]
pub enum ExecutorError<S> {
    /// A node returned an error after exhausting its retry budget.
    NodeFailed {
        node: NodeId,
        source: NodeError,
    },
    /// A node panicked; siblings of the same superstep are unaffected.
    NodePanic {
        node: NodeId,
        message: String,
    },
    /// A non-terminal node had no applicable outgoing edge.
    NoOutgoingEdge {
        node: NodeId,
    },
    /// Routing targeted a node that was never registered.
    NodeNotFound {
        node: NodeId,
    },
    /// A reducer or merge function failed.
    Schema(SchemaError),
    /// The run configuration's cancellation signal fired.
    Cancelled,
    /// Controlled suspension; see [`GraphInterrupt`].
    Interrupted(GraphInterrupt<S>),
}

impl<S> ExecutorError<S> {
    /// The interrupt envelope, when this is a suspension.
    #[must_use]
    pub fn as_interrupt(&self) -> Option<&GraphInterrupt<S>> {
        match self {
            Self::Interrupted(interrupt) => Some(interrupt),
            _ => None,
        }
    }

    /// Consume into the interrupt envelope, or hand the error back.
    pub fn into_interrupt(self) -> Result<GraphInterrupt<S>, Self> {
        match self {
            Self::Interrupted(interrupt) => Ok(interrupt),
            other => Err(other),
        }
    }

    /// Returns `true` for controlled suspensions.
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

impl<S> fmt::Display for ExecutorError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeFailed { node, source } => {
                write!(f, "error in node {node}: {source}")
            }
            Self::NodePanic { node, message } => {
                write!(f, "panic in node {node}: {message}")
            }
            Self::NoOutgoingEdge { node } => {
                write!(f, "no outgoing edge from node {node}")
            }
            Self::NodeNotFound { node } => write!(f, "node not found: {node}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::Cancelled => write!(f, "invocation cancelled"),
            Self::Interrupted(interrupt) => write!(f, "{interrupt}"),
        }
    }
}

impl<S: fmt::Debug> std::error::Error for ExecutorError<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NodeFailed { source, .. } => Some(source),
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl<S> From<SchemaError> for ExecutorError<S> {
    fn from(err: SchemaError) -> Self {
        Self::Schema(err)
    }
}

/// Hook invoked after every completed superstep; used by the checkpoint
/// layer to persist snapshots without owning the loop.
#[async_trait]
pub(crate) trait StepObserver<S>: Send + Sync {
    async fn on_step(&self, step: u64, ran: &[NodeId], state: &S, next: &[NodeId]);
}

/// An executable workflow graph.
///
/// Produced by [`GraphBuilder::compile`](crate::graph::GraphBuilder::compile).
/// The topology is frozen; listeners may still be added and removed. A
/// compiled graph is reusable; each invocation gets its own ephemeral
/// scheduling state.
pub struct CompiledGraph<S> {
    nodes: FxHashMap<NodeId, NodeEntry<S>>,
    edges: FxHashMap<NodeId, Vec<NodeId>>,
    routers: FxHashMap<NodeId, Router<S>>,
    entry_point: NodeId,
    schema: Option<Arc<dyn StateSchema<S>>>,
    merger: Option<StateMerger<S>>,
    retry_policy: RetryPolicy,
    listeners: Arc<ListenerHub<S>>,
}

impl<S> Clone for CompiledGraph<S> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            routers: self.routers.clone(),
            entry_point: self.entry_point.clone(),
            schema: self.schema.clone(),
            merger: self.merger.clone(),
            retry_policy: self.retry_policy.clone(),
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<S: GraphState> CompiledGraph<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        nodes: FxHashMap<NodeId, NodeEntry<S>>,
        edges: FxHashMap<NodeId, Vec<NodeId>>,
        routers: FxHashMap<NodeId, Router<S>>,
        entry_point: NodeId,
        schema: Option<Arc<dyn StateSchema<S>>>,
        merger: Option<StateMerger<S>>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            nodes,
            edges,
            routers,
            entry_point,
            schema,
            merger,
            retry_policy,
            listeners: Arc::new(ListenerHub::new()),
        }
    }

    /// The node execution starts from.
    #[must_use]
    pub fn entry_point(&self) -> &NodeId {
        &self.entry_point
    }

    /// The description a node was registered with.
    #[must_use]
    pub fn node_description(&self, name: impl Into<NodeId>) -> Option<&str> {
        self.nodes.get(&name.into()).map(NodeEntry::description)
    }

    /// Static edges, keyed by source node.
    #[must_use]
    pub fn edges(&self) -> &FxHashMap<NodeId, Vec<NodeId>> {
        &self.edges
    }

    /// The configured state schema, if any.
    #[must_use]
    pub fn schema(&self) -> Option<&Arc<dyn StateSchema<S>>> {
        self.schema.as_ref()
    }

    /// The listener registry of this graph.
    #[must_use]
    pub fn listeners(&self) -> &Arc<ListenerHub<S>> {
        &self.listeners
    }

    /// Register a listener on every node and chain-level events.
    pub fn add_listener(&self, listener: Arc<dyn Listener<S>>) -> ListenerId {
        self.listeners.add_global(listener)
    }

    /// Register a listener on a single node.
    pub fn add_node_listener(
        &self,
        node: impl Into<NodeId>,
        listener: Arc<dyn Listener<S>>,
    ) -> ListenerId {
        self.listeners.add_for_node(node, listener)
    }

    /// Remove a listener by id.
    pub fn remove_listener(&self, id: &ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Execute with a default configuration.
    pub async fn invoke(&self, initial: S) -> Result<S, ExecutorError<S>> {
        self.invoke_with_config(initial, RunConfig::default()).await
    }

    /// Execute under a run configuration.
    ///
    /// On a controlled stop the result is
    /// `Err(ExecutorError::Interrupted(GraphInterrupt { state, .. }))`; the
    /// state at the stop lives inside the envelope.
    #[instrument(skip(self, initial, config), fields(entry = %self.entry_point))]
    pub async fn invoke_with_config(
        &self,
        initial: S,
        config: RunConfig<S>,
    ) -> Result<S, ExecutorError<S>> {
        self.run(initial, config, None).await
    }

    pub(crate) async fn run(
        &self,
        initial: S,
        config: RunConfig<S>,
        observer: Option<&dyn StepObserver<S>>,
    ) -> Result<S, ExecutorError<S>> {
        let events = Arc::new(EventFanout::new(
            Arc::clone(&self.listeners),
            config.callbacks.clone(),
        ));
        let resume = ResumeSlot::new(config.resume_value.clone());

        let mut state = initial;
        let mut frontier = if config.resume_from.is_empty() {
            vec![self.entry_point.clone()]
        } else {
            config.resume_from.clone()
        };
        let mut step: u64 = 0;

        events
            .notify(StreamEvent::chain_start(
                state.clone(),
                chain_metadata(&config),
            ))
            .await;

        let outcome = loop {
            frontier = dedup_frontier(frontier.into_iter().filter(|n| !n.is_end()));
            if frontier.is_empty() {
                break Ok(state);
            }
            if config.is_cancelled() {
                break Err(ExecutorError::Cancelled);
            }
            if let Some(node) = frontier.iter().find(|n| config.interrupt_before.contains(n)) {
                break Err(ExecutorError::Interrupted(GraphInterrupt {
                    node: node.clone(),
                    state: state.clone(),
                    next_nodes: frontier.clone(),
                    interrupt_value: None,
                }));
            }

            step += 1;
            tracing::debug!(step, frontier = ?frontier, "superstep");

            match self
                .run_superstep(&frontier, &state, step, &events, &resume, &config)
                .await
            {
                Err(stop) => break Err(stop),
                Ok(outputs) => {
                    match self.merge_outputs(state, &outputs) {
                        Ok(merged) => state = merged,
                        Err(stop) => break Err(stop),
                    }

                    let next = match self.next_frontier(&frontier, &outputs, &state) {
                        Ok(next) => next,
                        Err(stop) => break Err(stop),
                    };

                    if let Some(node) =
                        frontier.iter().find(|n| config.interrupt_after.contains(n))
                    {
                        break Err(ExecutorError::Interrupted(GraphInterrupt {
                            node: node.clone(),
                            state: state.clone(),
                            next_nodes: next,
                            interrupt_value: None,
                        }));
                    }

                    if let Some(schema) = &self.schema {
                        state = schema.finalize_step(state);
                    }

                    if let Some(observer) = observer {
                        observer.on_step(step, &frontier, &state, &next).await;
                    }

                    events
                        .notify(superstep_event(step, &frontier, &next))
                        .await;

                    frontier = next;
                }
            }
        };

        match &outcome {
            Ok(state) => {
                events
                    .notify(StreamEvent::chain_end(Some(state.clone()), None))
                    .await;
            }
            Err(ExecutorError::Interrupted(interrupt)) => {
                // A suspension is not a failure; the final state travels in
                // the envelope and the chain_end carries no error.
                events
                    .notify(StreamEvent::chain_end(Some(interrupt.state.clone()), None))
                    .await;
            }
            Err(err) => {
                events
                    .notify(StreamEvent::chain_end(None, Some(err.to_string())))
                    .await;
            }
        }

        outcome
    }

    /// Run every frontier node concurrently and collect outputs in frontier
    /// order.
    async fn run_superstep(
        &self,
        frontier: &[NodeId],
        state: &S,
        step: u64,
        events: &Arc<EventFanout<S>>,
        resume: &ResumeSlot,
        config: &RunConfig<S>,
    ) -> Result<Vec<(NodeId, NodeOutput<S>)>, ExecutorError<S>> {
        let mut handles = Vec::with_capacity(frontier.len());
        for node_id in frontier {
            let entry = self
                .nodes
                .get(node_id)
                .ok_or_else(|| ExecutorError::NodeNotFound {
                    node: node_id.clone(),
                })?;
            let node = Arc::clone(&entry.node);
            let ctx = NodeContext {
                node: node_id.clone(),
                step,
                events: Arc::clone(events),
                resume: resume.clone(),
                cancellation: config.cancellation.clone(),
            };
            let id = node_id.clone();
            let snapshot = state.clone();
            let policy = self.retry_policy.clone();
            let fan = Arc::clone(events);
            handles.push((
                node_id.clone(),
                tokio::spawn(async move {
                    fan.notify(StreamEvent::node_start(id.clone(), step, snapshot.clone()))
                        .await;
                    let started = Instant::now();
                    let result = run_with_retry(node, snapshot, ctx, &policy).await;
                    let elapsed = started.elapsed();
                    match &result {
                        Ok(output) => {
                            let update = match output {
                                NodeOutput::Update(s) => Some(s.clone()),
                                NodeOutput::Command(c) => c.update.clone(),
                            };
                            fan.notify(StreamEvent::node_complete(
                                id.clone(),
                                step,
                                update,
                                elapsed,
                            ))
                            .await;
                        }
                        Err(err) if err.is_interrupt() => {}
                        Err(err) => {
                            fan.notify(StreamEvent::node_error(
                                id.clone(),
                                step,
                                err.to_string(),
                                elapsed,
                            ))
                            .await;
                        }
                    }
                    result
                }),
            ));
        }

        let mut outputs = Vec::with_capacity(handles.len());
        let mut first_error: Option<ExecutorError<S>> = None;
        let mut interrupt: Option<(NodeId, Value)> = None;
        for (node_id, handle) in handles {
            match handle.await {
                Ok(Ok(output)) => outputs.push((node_id, output)),
                Ok(Err(NodeError::Interrupted(signal))) => {
                    if interrupt.is_none() {
                        interrupt = Some((node_id, signal.value));
                    }
                }
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(ExecutorError::NodeFailed {
                            node: node_id,
                            source: err,
                        });
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        let message = if join_err.is_panic() {
                            panic_message(join_err.into_panic())
                        } else {
                            join_err.to_string()
                        };
                        first_error = Some(ExecutorError::NodePanic {
                            node: node_id,
                            message,
                        });
                    }
                }
            }
        }

        // Dynamic interrupts take precedence over sibling failures; partial
        // results of the superstep are discarded either way.
        if let Some((node, value)) = interrupt {
            return Err(ExecutorError::Interrupted(GraphInterrupt {
                node: node.clone(),
                state: state.clone(),
                next_nodes: vec![node],
                interrupt_value: Some(value),
            }));
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(outputs)
    }

    /// Fold the superstep's updates into the state.
    fn merge_outputs(
        &self,
        state: S,
        outputs: &[(NodeId, NodeOutput<S>)],
    ) -> Result<S, ExecutorError<S>> {
        let updates: Vec<S> = outputs
            .iter()
            .filter_map(|(_, output)| match output {
                NodeOutput::Update(s) => Some(s.clone()),
                NodeOutput::Command(c) => c.update.clone(),
            })
            .collect();

        if let Some(schema) = &self.schema {
            let mut merged = state;
            for update in updates {
                merged = schema.apply(merged, update)?;
            }
            Ok(merged)
        } else if let Some(merger) = &self.merger {
            if updates.is_empty() {
                Ok(state)
            } else {
                Ok(merger(state, updates)?)
            }
        } else if let Some(last) = updates.into_iter().next_back() {
            Ok(last)
        } else {
            Ok(state)
        }
    }

    /// Compute the next frontier from commands, routers, and static edges.
    fn next_frontier(
        &self,
        frontier: &[NodeId],
        outputs: &[(NodeId, NodeOutput<S>)],
        state: &S,
    ) -> Result<Vec<NodeId>, ExecutorError<S>> {
        let commanded: Vec<NodeId> = outputs
            .iter()
            .filter_map(|(_, output)| match output {
                NodeOutput::Command(Command { goto, .. }) if !goto.is_empty() => {
                    Some(goto.iter().cloned())
                }
                _ => None,
            })
            .flatten()
            .collect();
        if !commanded.is_empty() {
            let next = dedup_frontier(commanded.into_iter());
            self.validate_targets(&next)?;
            return Ok(next);
        }

        let mut next = Vec::new();
        for node_id in frontier {
            if let Some(router) = self.routers.get(node_id) {
                next.push(router(state));
            } else {
                match self.edges.get(node_id) {
                    Some(targets) if !targets.is_empty() => next.extend(targets.iter().cloned()),
                    _ => {
                        return Err(ExecutorError::NoOutgoingEdge {
                            node: node_id.clone(),
                        })
                    }
                }
            }
        }
        let next = dedup_frontier(next.into_iter());
        self.validate_targets(&next)?;
        Ok(next)
    }

    fn validate_targets(&self, targets: &[NodeId]) -> Result<(), ExecutorError<S>> {
        for target in targets {
            if !target.is_end() && !self.nodes.contains_key(target) {
                return Err(ExecutorError::NodeNotFound {
                    node: target.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Run one node with its retry budget.
///
/// Between attempts the task sleeps per the backoff strategy; the run's
/// cancellation signal short-circuits the wait. Interrupt sentinels are
/// never retried.
async fn run_with_retry<S: GraphState>(
    node: Arc<dyn Node<S>>,
    state: S,
    ctx: NodeContext<S>,
    policy: &RetryPolicy,
) -> Result<NodeOutput<S>, NodeError> {
    let mut attempt: u32 = 1;
    loop {
        match node.run(state.clone(), ctx.clone()).await {
            Ok(output) => return Ok(output),
            Err(err) if err.is_interrupt() => return Err(err),
            Err(err) => {
                if attempt > policy.max_retries || !policy.is_retryable(&err) {
                    return Err(err);
                }
                let delay = policy.delay(attempt);
                tracing::debug!(node = %ctx.node, attempt, ?delay, error = %err, "retrying node");
                match ctx.cancellation.clone() {
                    Some(mut cancel) => {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            changed = cancel.changed() => {
                                if changed.is_err() || *cancel.borrow() {
                                    return Err(err);
                                }
                            }
                        }
                    }
                    None => tokio::time::sleep(delay).await,
                }
                attempt += 1;
            }
        }
    }
}

fn chain_metadata<S>(config: &RunConfig<S>) -> FxHashMap<String, Value> {
    let mut metadata = FxHashMap::default();
    if !config.tags.is_empty() {
        metadata.insert("tags".to_string(), json!(config.tags));
    }
    if !config.metadata.is_empty() {
        metadata.insert(
            "metadata".to_string(),
            Value::Object(
                config
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        );
    }
    if !config.configurable.is_empty() {
        metadata.insert(
            "configurable".to_string(),
            Value::Object(
                config
                    .configurable
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        );
    }
    metadata
}

fn superstep_event<S>(step: u64, ran: &[NodeId], next: &[NodeId]) -> StreamEvent<S> {
    let mut metadata = FxHashMap::default();
    metadata.insert("step".to_string(), json!(step));
    metadata.insert("scope".to_string(), json!("superstep"));
    metadata.insert(
        "ran".to_string(),
        json!(ran.iter().map(NodeId::encode).collect::<Vec<_>>()),
    );
    metadata.insert(
        "next".to_string(),
        json!(next.iter().map(NodeId::encode).collect::<Vec<_>>()),
    );
    StreamEvent {
        timestamp: chrono::Utc::now(),
        node: None,
        kind: StreamEventKind::Custom,
        state: None,
        error: None,
        metadata,
        duration: None,
    }
}

fn dedup_frontier(ids: impl Iterator<Item = NodeId>) -> Vec<NodeId> {
    let mut seen = Vec::new();
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
