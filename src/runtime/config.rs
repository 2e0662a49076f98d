//! Per-invocation run configuration.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::watch;

use crate::listener::Listener;
use crate::types::NodeId;

/// Configurable key carrying the logical thread identifier.
pub const THREAD_ID_KEY: &str = "thread_id";

/// Configurable key addressing a specific checkpoint.
pub const CHECKPOINT_ID_KEY: &str = "checkpoint_id";

/// Options recognized by a single invocation.
///
/// `configurable` is an opaque key/value map; the engine itself reads only
/// [`THREAD_ID_KEY`] and [`CHECKPOINT_ID_KEY`], everything else is passed
/// through to listeners on `chain_start`. `tags` and `metadata` are opaque
/// passthrough as well.
///
/// # Examples
///
/// ```rust
/// use stepgraph::runtime::RunConfig;
/// use stepgraph::schema::MapState;
///
/// let config: RunConfig<MapState> = RunConfig::new()
///     .with_thread_id("conversation-7")
///     .with_interrupt_before(["approval"]);
/// assert_eq!(config.thread_id(), Some("conversation-7"));
/// ```
pub struct RunConfig<S> {
    /// Opaque configuration map, notably `thread_id` and `checkpoint_id`.
    pub configurable: FxHashMap<String, Value>,
    /// Nodes to stop before executing.
    pub interrupt_before: Vec<NodeId>,
    /// Nodes to stop after executing.
    pub interrupt_after: Vec<NodeId>,
    /// Frontier to start from instead of the entry point.
    pub resume_from: Vec<NodeId>,
    /// Value returned by the first in-node interrupt of this run.
    pub resume_value: Option<Value>,
    /// Per-invocation observers, notified alongside registered listeners.
    pub callbacks: Vec<Arc<dyn Listener<S>>>,
    /// Opaque tags forwarded to listeners on `chain_start`.
    pub tags: Vec<String>,
    /// Opaque metadata forwarded to listeners on `chain_start`.
    pub metadata: FxHashMap<String, Value>,
    /// Cancellation signal observed between supersteps and inside retry
    /// waits.
    pub cancellation: Option<watch::Receiver<bool>>,
}

impl<S> Default for RunConfig<S> {
    fn default() -> Self {
        Self {
            configurable: FxHashMap::default(),
            interrupt_before: Vec::new(),
            interrupt_after: Vec::new(),
            resume_from: Vec::new(),
            resume_value: None,
            callbacks: Vec::new(),
            tags: Vec::new(),
            metadata: FxHashMap::default(),
            cancellation: None,
        }
    }
}

impl<S> Clone for RunConfig<S> {
    fn clone(&self) -> Self {
        Self {
            configurable: self.configurable.clone(),
            interrupt_before: self.interrupt_before.clone(),
            interrupt_after: self.interrupt_after.clone(),
            resume_from: self.resume_from.clone(),
            resume_value: self.resume_value.clone(),
            callbacks: self.callbacks.clone(),
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<S> RunConfig<S> {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the logical thread identifier used for checkpoint grouping.
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.configurable
            .insert(THREAD_ID_KEY.to_string(), Value::String(thread_id.into()));
        self
    }

    /// Address a specific checkpoint for state lookups.
    #[must_use]
    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.configurable.insert(
            CHECKPOINT_ID_KEY.to_string(),
            Value::String(checkpoint_id.into()),
        );
        self
    }

    /// Stop with an interrupt before any of these nodes execute.
    #[must_use]
    pub fn with_interrupt_before<I, T>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
    {
        self.interrupt_before = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Stop with an interrupt after any of these nodes execute.
    #[must_use]
    pub fn with_interrupt_after<I, T>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
    {
        self.interrupt_after = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Start from this frontier instead of the entry point, optionally
    /// supplying the value the first in-node interrupt returns.
    #[must_use]
    pub fn with_resume<I, T>(mut self, frontier: I, resume_value: Option<Value>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
    {
        self.resume_from = frontier.into_iter().map(Into::into).collect();
        self.resume_value = resume_value;
        self
    }

    /// Attach a per-invocation observer.
    #[must_use]
    pub fn with_callback(mut self, callback: Arc<dyn Listener<S>>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Attach a cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancellation = Some(rx);
        self
    }

    /// The configured thread id, if any.
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.configurable.get(THREAD_ID_KEY).and_then(Value::as_str)
    }

    /// The configured checkpoint id, if any.
    #[must_use]
    pub fn checkpoint_id(&self) -> Option<&str> {
        self.configurable
            .get(CHECKPOINT_ID_KEY)
            .and_then(Value::as_str)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }
}
