//! Opaque key/value state with per-key reducers.
//!
//! [`MapState`] stores `Arc`-shared JSON values so that cloning a state for
//! a superstep is cheap and, crucially, so that reference aliasing between
//! a node's input and its returned update is detectable. [`MapSchema`]
//! merges updates key by key through registered [`Reducer`]s.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::reducers::Reducer;
use super::{SchemaError, StateSchema};

/// Shared, immutable value stored under a state key.
///
/// Sharing the buffer lets snapshots alias instead of deep-copying, and
/// lets [`MapSchema::apply`] recognize when a node handed back the exact
/// value it received.
pub type SharedValue = Arc<Value>;

/// Ordered mapping from string keys to opaque values.
///
/// The standard state container for graphs that do not define their own
/// state struct. Keys absent from an update are preserved across merges.
///
/// # Examples
///
/// ```rust
/// use stepgraph::schema::MapState;
/// use serde_json::json;
///
/// let state = MapState::new()
///     .with("messages", json!(["hello"]))
///     .with("count", json!(1));
///
/// assert_eq!(state.get("count"), Some(&json!(1)));
/// assert_eq!(state.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapState {
    entries: FxHashMap<String, SharedValue>,
}

impl MapState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value under `key`, replacing any existing entry.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), Arc::new(value));
    }

    /// Insert an already-shared value under `key`.
    ///
    /// Passing a buffer obtained from [`get_shared`](Self::get_shared)
    /// back through an update marks the key as aliased, which the schema
    /// treats as "unchanged".
    pub fn insert_shared(&mut self, key: impl Into<String>, value: SharedValue) {
        self.entries.insert(key.into(), value);
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up the value under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|v| &**v)
    }

    /// Look up the shared buffer under `key`.
    #[must_use]
    pub fn get_shared(&self, key: &str) -> Option<&SharedValue> {
        self.entries.get(key)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove the entry under `key`, returning its buffer.
    pub fn remove(&mut self, key: &str) -> Option<SharedValue> {
        self.entries.remove(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the state holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), &**v))
    }

    /// Iterate over the keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Value)> for MapState {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k, Arc::new(v)))
                .collect(),
        }
    }
}

/// Schema for [`MapState`]: initial entries, per-key reducers, and
/// ephemeral keys cleared after every superstep.
///
/// Merge rule, per key of the update:
/// - when the current and incoming buffers are the same allocation
///   (`Arc::ptr_eq`), the key is left untouched: a node returned the value
///   it received, and running a reducer would manufacture self-append
///   artifacts;
/// - when a reducer is registered for the key, it combines the two values;
/// - otherwise the incoming value overwrites.
///
/// Keys present only in the current state are always preserved.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use stepgraph::schema::{Append, MapSchema, MapState, StateSchema};
/// use serde_json::json;
///
/// let schema = MapSchema::new()
///     .with_initial(MapState::new().with("messages", json!([])))
///     .with_reducer("messages", Arc::new(Append));
///
/// let current = schema.init();
/// let update = MapState::new().with("messages", json!(["hi"]));
/// let next = schema.apply(current, update).unwrap();
/// assert_eq!(next.get("messages"), Some(&json!(["hi"])));
/// ```
#[derive(Clone, Default)]
pub struct MapSchema {
    initial: MapState,
    reducers: FxHashMap<String, Arc<dyn Reducer>>,
    ephemeral_keys: Vec<String>,
}

impl MapSchema {
    /// Creates a schema with an empty initial state and no reducers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial state returned by [`StateSchema::init`].
    #[must_use]
    pub fn with_initial(mut self, initial: MapState) -> Self {
        self.initial = initial;
        self
    }

    /// Register a reducer for a key. Unregistered keys overwrite.
    #[must_use]
    pub fn with_reducer(mut self, key: impl Into<String>, reducer: Arc<dyn Reducer>) -> Self {
        self.reducers.insert(key.into(), reducer);
        self
    }

    /// Mark a key as ephemeral: cleared by the cleanup hook after each
    /// superstep.
    #[must_use]
    pub fn with_ephemeral_key(mut self, key: impl Into<String>) -> Self {
        self.ephemeral_keys.push(key.into());
        self
    }
}

impl StateSchema<MapState> for MapSchema {
    fn init(&self) -> MapState {
        self.initial.clone()
    }

    fn apply(&self, mut current: MapState, update: MapState) -> Result<MapState, SchemaError> {
        for (key, incoming) in update.entries {
            match current.entries.get(&key) {
                // Aliased buffer: the node returned the value it was given.
                Some(existing) if Arc::ptr_eq(existing, &incoming) => {
                    tracing::debug!(key = %key, "skipping aliased update");
                }
                Some(existing) => {
                    let merged = match self.reducers.get(&key) {
                        Some(reducer) => reducer.combine(&key, existing, &incoming)?,
                        None => incoming,
                    };
                    current.entries.insert(key, merged);
                }
                None => {
                    current.entries.insert(key, incoming);
                }
            }
        }
        Ok(current)
    }

    fn finalize_step(&self, mut state: MapState) -> MapState {
        for key in &self.ephemeral_keys {
            state.entries.remove(key);
        }
        state
    }
}
