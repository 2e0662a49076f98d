//! Node lifecycle listeners.
//!
//! Every compiled graph carries a [`ListenerHub`]: an ordered registry of
//! observers attached either globally (every node) or to a single node.
//! The executor notifies the hub at node boundaries (`node_start`, then
//! `node_complete` or `node_error`) and for chain-level events; nodes emit
//! progress/tool/LLM events through their context.
//!
//! Dispatch spawns one task per listener and joins them before the
//! notifying call returns, so a node's reported completion implies every
//! listener observed it. A panicking listener is isolated to its own task
//! and swallowed.

mod events;

pub use events::{StreamEvent, StreamEventKind};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::types::{GraphState, NodeId};

/// Observer of node lifecycle events.
///
/// Implementations must be cheap to invoke or internally offload; dispatch
/// is joined before the observed node's completion is reported.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use stepgraph::listener::{Listener, StreamEvent};
/// use stepgraph::schema::MapState;
///
/// struct LogListener;
///
/// #[async_trait]
/// impl Listener<MapState> for LogListener {
///     async fn on_event(&self, event: StreamEvent<MapState>) {
///         if let Some(node) = &event.node {
///             tracing::debug!(%node, kind = %event.kind, "node event");
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Listener<S>: Send + Sync {
    /// Observe a single lifecycle event.
    async fn on_event(&self, event: StreamEvent<S>);
}

/// Handle identifying a registered listener for later removal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct HubInner<S> {
    global: Vec<(ListenerId, Arc<dyn Listener<S>>)>,
    by_node: FxHashMap<NodeId, Vec<(ListenerId, Arc<dyn Listener<S>>)>>,
}

impl<S> Default for HubInner<S> {
    fn default() -> Self {
        Self {
            global: Vec::new(),
            by_node: FxHashMap::default(),
        }
    }
}

/// Registry of global and per-node listeners.
///
/// The listener lists are the only mutable part of a compiled graph; they
/// are guarded by a reader/writer lock and reads take a snapshot before
/// dispatch, so registration changes never race an in-flight notification.
pub struct ListenerHub<S> {
    inner: RwLock<HubInner<S>>,
}

impl<S> Default for ListenerHub<S> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HubInner::default()),
        }
    }
}

impl<S: GraphState> ListenerHub<S> {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener on every node (and for chain-level events).
    pub fn add_global(&self, listener: Arc<dyn Listener<S>>) -> ListenerId {
        let id = ListenerId::new();
        self.inner.write().global.push((id.clone(), listener));
        id
    }

    /// Register a listener on a single node.
    pub fn add_for_node(&self, node: impl Into<NodeId>, listener: Arc<dyn Listener<S>>) -> ListenerId {
        let id = ListenerId::new();
        self.inner
            .write()
            .by_node
            .entry(node.into())
            .or_default()
            .push((id.clone(), listener));
        id
    }

    /// Remove a listener by its id. Returns `true` when one was removed.
    pub fn remove(&self, id: &ListenerId) -> bool {
        let mut inner = self.inner.write();
        let before = inner.global.len();
        inner.global.retain(|(lid, _)| lid != id);
        if inner.global.len() != before {
            return true;
        }
        for listeners in inner.by_node.values_mut() {
            let before = listeners.len();
            listeners.retain(|(lid, _)| lid != id);
            if listeners.len() != before {
                return true;
            }
        }
        false
    }

    /// Remove every registration of the given listener instance.
    ///
    /// Matching is by `Arc` identity. Returns the number of registrations
    /// removed.
    pub fn remove_by_ref(&self, listener: &Arc<dyn Listener<S>>) -> usize {
        let mut inner = self.inner.write();
        let mut removed = 0;
        inner.global.retain(|(_, l)| {
            let keep = !Arc::ptr_eq(l, listener);
            if !keep {
                removed += 1;
            }
            keep
        });
        for listeners in inner.by_node.values_mut() {
            listeners.retain(|(_, l)| {
                let keep = !Arc::ptr_eq(l, listener);
                if !keep {
                    removed += 1;
                }
                keep
            });
        }
        removed
    }

    /// Total number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.global.len() + inner.by_node.values().map(Vec::len).sum::<usize>()
    }

    /// Returns `true` when no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the listeners applicable to an event on `node`.
    ///
    /// Chain-level events (no node) reach global listeners only.
    fn snapshot_for(&self, node: Option<&NodeId>) -> Vec<Arc<dyn Listener<S>>> {
        let inner = self.inner.read();
        let mut listeners: Vec<Arc<dyn Listener<S>>> =
            inner.global.iter().map(|(_, l)| Arc::clone(l)).collect();
        if let Some(node) = node {
            if let Some(scoped) = inner.by_node.get(node) {
                listeners.extend(scoped.iter().map(|(_, l)| Arc::clone(l)));
            }
        }
        listeners
    }
}

/// Per-invocation fan-out joining the graph's hub with the run
/// configuration's callbacks.
pub(crate) struct EventFanout<S> {
    hub: Arc<ListenerHub<S>>,
    callbacks: Vec<Arc<dyn Listener<S>>>,
}

impl<S: GraphState> EventFanout<S> {
    pub(crate) fn new(hub: Arc<ListenerHub<S>>, callbacks: Vec<Arc<dyn Listener<S>>>) -> Self {
        Self { hub, callbacks }
    }

    /// Dispatch an event to every applicable listener and join.
    pub(crate) async fn notify(&self, event: StreamEvent<S>) {
        let mut targets = self.hub.snapshot_for(event.node.as_ref());
        targets.extend(self.callbacks.iter().cloned());
        dispatch(targets, event).await;
    }
}

/// Spawn one task per listener and join them, swallowing panics.
async fn dispatch<S: GraphState>(listeners: Vec<Arc<dyn Listener<S>>>, event: StreamEvent<S>) {
    if listeners.is_empty() {
        return;
    }
    let handles: Vec<_> = listeners
        .into_iter()
        .map(|listener| {
            let event = event.clone();
            tokio::spawn(async move { listener.on_event(event).await })
        })
        .collect();
    for outcome in futures_util::future::join_all(handles).await {
        if let Err(err) = outcome {
            if err.is_panic() {
                tracing::warn!("listener panicked during dispatch; ignoring");
            }
        }
    }
}
