//! Checkpointing runnable: per-thread persistence around a compiled graph.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

use super::store::{
    Checkpoint, CheckpointStore, StoreError, EVENT_INTERRUPT, EVENT_KEY, EVENT_MANUAL_SAVE,
    EVENT_STEP, EVENT_UPDATE_STATE, UPDATED_BY_KEY,
};
use crate::runtime::{CompiledGraph, ExecutorError, RunConfig, StepObserver, THREAD_ID_KEY};
use crate::schema::SchemaError;
use crate::types::{GraphState, NodeId};
use crate::utils::ids::IdGenerator;

/// Errors from checkpoint-level operations.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    /// The underlying store failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    /// Applying an external update through the schema failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    /// The thread has no checkpoint yet.
    #[error("no checkpoint recorded for thread `{thread_id}`")]
    #[diagnostic(
        code(stepgraph::checkpoint::empty_thread),
        help("Run the graph with this thread id first, or save a checkpoint manually.")
    )]
    NoCheckpoint { thread_id: String },
}

/// Snapshot view returned by [`CheckpointRunner::get_state`].
#[derive(Clone, Debug)]
pub struct StateInfo<S> {
    /// The checkpointed state.
    pub values: S,
    /// Nodes execution would continue from.
    pub next: Vec<NodeId>,
    /// The thread the snapshot belongs to.
    pub thread_id: String,
    /// The checkpoint the snapshot was read from.
    pub checkpoint_id: String,
    /// The checkpoint's metadata.
    pub metadata: FxHashMap<String, Value>,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
}

/// Wraps a [`CompiledGraph`] with versioned per-thread checkpointing.
///
/// Snapshots are grouped by the logical `thread_id` from the run
/// configuration, falling back to this runner's `execution_id`; independent
/// threads resume independently. After every superstep, when auto-save is
/// on, the state is persisted at the thread's next version; save failures
/// are logged and never abort the run.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use stepgraph::checkpoint::{CheckpointRunner, InMemoryStore};
/// use stepgraph::runtime::{CompiledGraph, RunConfig};
/// use stepgraph::schema::MapState;
///
/// # async fn example(graph: CompiledGraph<MapState>) {
/// let runner = CheckpointRunner::new(graph, Arc::new(InMemoryStore::new()));
/// let config = RunConfig::new().with_thread_id("conversation-1");
/// let _ = runner.invoke_with_config(MapState::new(), config).await;
/// # }
/// ```
pub struct CheckpointRunner<S: GraphState> {
    graph: CompiledGraph<S>,
    store: Arc<dyn CheckpointStore<S>>,
    execution_id: String,
    auto_save: bool,
    max_checkpoints: Option<usize>,
}

impl<S: GraphState> CheckpointRunner<S> {
    /// Wrap a compiled graph with a checkpoint store.
    ///
    /// Auto-save is enabled and the execution id generated.
    #[must_use]
    pub fn new(graph: CompiledGraph<S>, store: Arc<dyn CheckpointStore<S>>) -> Self {
        Self {
            graph,
            store,
            execution_id: IdGenerator::new().execution_id(),
            auto_save: true,
            max_checkpoints: None,
        }
    }

    /// Toggle automatic per-superstep saves.
    #[must_use]
    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    /// Cap retained checkpoints per thread; the oldest versions are pruned.
    #[must_use]
    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = Some(max);
        self
    }

    /// Replace the generated execution id.
    pub fn set_execution_id(&mut self, execution_id: impl Into<String>) {
        self.execution_id = execution_id.into();
    }

    /// This runner's execution id, the thread fallback when the run
    /// configuration carries none.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// The wrapped graph.
    #[must_use]
    pub fn graph(&self) -> &CompiledGraph<S> {
        &self.graph
    }

    fn thread_id<C>(&self, config: &RunConfig<C>) -> String {
        config
            .thread_id()
            .map(str::to_string)
            .unwrap_or_else(|| self.execution_id.clone())
    }

    /// Execute with a default configuration (thread = execution id).
    pub async fn invoke(&self, initial: S) -> Result<S, ExecutorError<S>> {
        self.invoke_with_config(initial, RunConfig::default()).await
    }

    /// Execute under a run configuration, checkpointing along the way.
    ///
    /// On a controlled stop a best-effort `interrupt` checkpoint is written
    /// before the envelope is returned.
    #[instrument(skip(self, initial, config), fields(execution = %self.execution_id))]
    pub async fn invoke_with_config(
        &self,
        initial: S,
        config: RunConfig<S>,
    ) -> Result<S, ExecutorError<S>> {
        let thread_id = self.thread_id(&config);
        let saver = AutoSaver {
            store: Arc::clone(&self.store),
            thread_id: thread_id.clone(),
            enabled: self.auto_save,
            max_checkpoints: self.max_checkpoints,
        };

        let outcome = self.graph.run(initial, config, Some(&saver)).await;

        if let Err(ExecutorError::Interrupted(interrupt)) = &outcome {
            let checkpoint = match saver.next_version().await {
                Ok(version) => Checkpoint::new(
                    thread_id.clone(),
                    interrupt.node.clone(),
                    interrupt.state.clone(),
                    version,
                )
                .with_metadata(EVENT_KEY, json!(EVENT_INTERRUPT))
                .with_metadata(THREAD_ID_KEY, json!(thread_id)),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping interrupt checkpoint");
                    return outcome;
                }
            };
            if let Err(err) = self.store.save(checkpoint).await {
                tracing::warn!(error = %err, "failed to save interrupt checkpoint");
            }
        }

        outcome
    }

    /// Resume an interrupted thread from its latest checkpoint.
    ///
    /// Loads the thread's latest state and re-invokes with
    /// `resume_from = [node]` and the given resume value; the node's pending
    /// interrupt call returns `resume_value` and execution continues.
    pub async fn resume_with(
        &self,
        config: RunConfig<S>,
        node: impl Into<NodeId>,
        resume_value: Value,
    ) -> Result<S, ResumeError<S>> {
        let thread_id = self.thread_id(&config);
        let latest = self
            .store
            .latest(&thread_id)
            .await
            .map_err(CheckpointError::from)?
            .ok_or(CheckpointError::NoCheckpoint {
                thread_id: thread_id.clone(),
            })?;
        let config = config.with_resume([node.into()], Some(resume_value));
        self.invoke_with_config(latest.state, config)
            .await
            .map_err(ResumeError::Executor)
    }

    /// Inspect a thread's state: the exact `checkpoint_id` when configured,
    /// otherwise the latest checkpoint of `thread_id`.
    pub async fn get_state(&self, config: &RunConfig<S>) -> Result<StateInfo<S>, CheckpointError> {
        let checkpoint = match config.checkpoint_id() {
            Some(id) => self
                .store
                .load(id)
                .await?
                .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?,
            None => {
                let thread_id = self.thread_id(config);
                self.store
                    .latest(&thread_id)
                    .await?
                    .ok_or(CheckpointError::NoCheckpoint { thread_id })?
            }
        };
        Ok(StateInfo {
            next: vec![checkpoint.node.clone()],
            thread_id: checkpoint.thread_id,
            checkpoint_id: checkpoint.id,
            metadata: checkpoint.metadata,
            created_at: checkpoint.created_at,
            values: checkpoint.state,
        })
    }

    /// Apply an external update on behalf of `as_node`.
    ///
    /// The update goes through the schema's merge (so reducers compose with
    /// the stored state), is written as a new checkpoint at the thread's
    /// next version, and the returned configuration addresses it. Without a
    /// schema the values replace the stored state.
    #[instrument(skip(self, config, values), fields(as_node = %as_node))]
    pub async fn update_state(
        &self,
        config: &RunConfig<S>,
        as_node: &str,
        values: S,
    ) -> Result<RunConfig<S>, CheckpointError> {
        let current = self.get_state(config).await?;
        let merged = match self.graph.schema() {
            Some(schema) => schema.apply(current.values, values)?,
            None => values,
        };

        let thread_id = current.thread_id.clone();
        let version = self.next_version(&thread_id).await?;
        let checkpoint = Checkpoint::new(
            thread_id.clone(),
            NodeId::named(as_node),
            merged,
            version,
        )
        .with_metadata(EVENT_KEY, json!(EVENT_UPDATE_STATE))
        .with_metadata("source", json!(EVENT_UPDATE_STATE))
        .with_metadata(UPDATED_BY_KEY, json!(as_node));
        let checkpoint_id = checkpoint.id.clone();
        self.store.save(checkpoint).await?;

        Ok(config
            .clone()
            .with_thread_id(thread_id)
            .with_checkpoint_id(checkpoint_id))
    }

    /// Save a checkpoint on demand at the thread's next version.
    pub async fn save_checkpoint(
        &self,
        config: &RunConfig<S>,
        node: impl Into<NodeId>,
        state: S,
    ) -> Result<String, CheckpointError> {
        let thread_id = self.thread_id(config);
        let version = self.next_version(&thread_id).await?;
        let checkpoint = Checkpoint::new(thread_id.clone(), node.into(), state, version)
            .with_metadata(EVENT_KEY, json!(EVENT_MANUAL_SAVE))
            .with_metadata(THREAD_ID_KEY, json!(thread_id));
        let id = checkpoint.id.clone();
        self.store.save(checkpoint).await?;
        Ok(id)
    }

    /// List a thread's checkpoints in ascending version order.
    pub async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<Checkpoint<S>>, CheckpointError> {
        Ok(self.store.list(thread_id).await?)
    }

    /// Load a checkpoint by id.
    pub async fn load_checkpoint(&self, id: &str) -> Result<Checkpoint<S>, CheckpointError> {
        Ok(self
            .store
            .load(id)
            .await?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?)
    }

    /// Remove every checkpoint of a thread.
    pub async fn clear_checkpoints(&self, thread_id: &str) -> Result<(), CheckpointError> {
        Ok(self.store.clear(thread_id).await?)
    }

    async fn next_version(&self, thread_id: &str) -> Result<u64, StoreError> {
        next_version(&*self.store, thread_id).await
    }
}

/// Resume failures: either checkpoint plumbing or the re-invocation itself.
#[derive(Debug)]
pub enum ResumeError<S> {
    /// Loading the checkpoint failed.
    Checkpoint(CheckpointError),
    /// The resumed invocation failed (or interrupted again).
    Executor(ExecutorError<S>),
}

impl<S> From<CheckpointError> for ResumeError<S> {
    fn from(err: CheckpointError) -> Self {
        Self::Checkpoint(err)
    }
}

impl<S> std::fmt::Display for ResumeError<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checkpoint(err) => write!(f, "{err}"),
            Self::Executor(err) => write!(f, "{err}"),
        }
    }
}

impl<S: std::fmt::Debug> std::error::Error for ResumeError<S> {}

async fn next_version<S: GraphState>(
    store: &dyn CheckpointStore<S>,
    thread_id: &str,
) -> Result<u64, StoreError> {
    Ok(store
        .list(thread_id)
        .await?
        .last()
        .map(|cp| cp.version + 1)
        .unwrap_or(1))
}

/// Per-invocation step observer persisting the state after each superstep.
struct AutoSaver<S: GraphState> {
    store: Arc<dyn CheckpointStore<S>>,
    thread_id: String,
    enabled: bool,
    max_checkpoints: Option<usize>,
}

impl<S: GraphState> AutoSaver<S> {
    async fn next_version(&self) -> Result<u64, StoreError> {
        next_version(&*self.store, &self.thread_id).await
    }

    async fn prune(&self) {
        let Some(max) = self.max_checkpoints else {
            return;
        };
        let checkpoints = match self.store.list(&self.thread_id).await {
            Ok(checkpoints) => checkpoints,
            Err(err) => {
                tracing::warn!(error = %err, "retention listing failed");
                return;
            }
        };
        if checkpoints.len() <= max {
            return;
        }
        let excess = checkpoints.len() - max;
        for stale in checkpoints.iter().take(excess) {
            if let Err(err) = self.store.delete(&stale.id).await {
                tracing::warn!(error = %err, id = %stale.id, "retention pruning failed");
            }
        }
    }
}

#[async_trait]
impl<S: GraphState> StepObserver<S> for AutoSaver<S> {
    async fn on_step(&self, step: u64, ran: &[NodeId], state: &S, _next: &[NodeId]) {
        if !self.enabled {
            return;
        }
        let version = match self.next_version().await {
            Ok(version) => version,
            Err(err) => {
                tracing::warn!(error = %err, step, "auto-save version lookup failed");
                return;
            }
        };
        let node = ran.last().cloned().unwrap_or(NodeId::End);
        let checkpoint = Checkpoint::new(self.thread_id.clone(), node, state.clone(), version)
            .with_metadata(EVENT_KEY, json!(EVENT_STEP))
            .with_metadata(THREAD_ID_KEY, json!(self.thread_id))
            .with_metadata("step", json!(step));
        if let Err(err) = self.store.save(checkpoint).await {
            // Auto-save is best-effort; the invocation keeps running.
            tracing::warn!(error = %err, step, "auto-save failed");
            return;
        }
        self.prune().await;
    }
}
