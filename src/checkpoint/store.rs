//! Checkpoint records and the store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{GraphState, NodeId};
use crate::utils::ids::IdGenerator;

/// Metadata key recording what produced a checkpoint.
pub const EVENT_KEY: &str = "event";
/// `event` value for automatic per-superstep saves.
pub const EVENT_STEP: &str = "step";
/// `event` value for caller-initiated saves.
pub const EVENT_MANUAL_SAVE: &str = "manual_save";
/// `event` value for human-in-the-loop state updates.
pub const EVENT_UPDATE_STATE: &str = "update_state";
/// `event` value for checkpoints written when a run suspends.
pub const EVENT_INTERRUPT: &str = "interrupt";
/// Metadata key naming the actor behind an external update.
pub const UPDATED_BY_KEY: &str = "updated_by";

/// A durable, versioned snapshot of a thread's state.
///
/// Versions are strictly increasing within a thread; the latest checkpoint
/// is the one with the greatest version. The timestamp is informational
/// only and never decides ordering.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint<S> {
    /// Globally unique checkpoint identifier.
    pub id: String,
    /// The logical thread this snapshot belongs to.
    pub thread_id: String,
    /// The node that produced the snapshot.
    pub node: NodeId,
    /// The persisted state.
    pub state: S,
    /// Monotonically increasing version within the thread.
    pub version: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Opaque metadata; see the `EVENT_*` keys.
    pub metadata: FxHashMap<String, Value>,
}

impl<S> Checkpoint<S> {
    /// Create a checkpoint with a generated id and the current time.
    #[must_use]
    pub fn new(
        thread_id: impl Into<String>,
        node: NodeId,
        state: S,
        version: u64,
    ) -> Self {
        Self {
            id: IdGenerator::new().checkpoint_id(),
            thread_id: thread_id.into(),
            node,
            state,
            version,
            created_at: Utc::now(),
            metadata: FxHashMap::default(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The `event` metadata entry, if recorded.
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        self.metadata.get(EVENT_KEY).and_then(Value::as_str)
    }
}

/// Errors from checkpoint store operations.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// No checkpoint exists under the requested identifier.
    #[error("checkpoint not found: {id}")]
    #[diagnostic(
        code(stepgraph::checkpoint::not_found),
        help("Check the checkpoint id `{id}` or list the thread's checkpoints.")
    )]
    NotFound { id: String },

    /// Filesystem failure in a file-backed store.
    #[error(transparent)]
    #[diagnostic(code(stepgraph::checkpoint::io))]
    Io(#[from] std::io::Error),

    /// Checkpoint (de)serialization failure.
    #[error("checkpoint serialization failed: {source}")]
    #[diagnostic(
        code(stepgraph::checkpoint::serde),
        help("Ensure the state type's serde representation is stable across runs.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    /// Any other backend failure.
    #[error("checkpoint store error: {message}")]
    #[diagnostic(code(stepgraph::checkpoint::backend))]
    Backend { message: String },
}

/// Persistent storage for versioned per-thread checkpoints.
///
/// Implementations must be internally thread-safe, and a completed `save`
/// must be observable to a subsequent `list`/`load` on the same store.
///
/// # Provided methods
///
/// [`latest`](Self::latest) resolves the greatest-version checkpoint of a
/// thread on top of [`list`](Self::list).
#[async_trait]
pub trait CheckpointStore<S: GraphState>: Send + Sync {
    /// Persist a checkpoint.
    async fn save(&self, checkpoint: Checkpoint<S>) -> Result<(), StoreError>;

    /// Load a checkpoint by id, from any thread.
    async fn load(&self, id: &str) -> Result<Option<Checkpoint<S>>, StoreError>;

    /// List a thread's checkpoints in ascending version order.
    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint<S>>, StoreError>;

    /// Delete a single checkpoint by id. Used for retention pruning.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Remove every checkpoint of a thread.
    async fn clear(&self, thread_id: &str) -> Result<(), StoreError>;

    /// The thread's checkpoint with the greatest version, if any.
    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, StoreError> {
        Ok(self.list(thread_id).await?.pop())
    }
}
