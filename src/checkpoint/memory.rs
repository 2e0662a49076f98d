//! Process-lifetime checkpoint store.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::store::{Checkpoint, CheckpointStore, StoreError};
use crate::types::GraphState;

/// In-memory checkpoint store.
///
/// Keeps every checkpoint of every thread in a per-thread vector sorted by
/// version, behind a single reader/writer lock. Non-durable; suited for
/// tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryStore<S> {
    inner: RwLock<FxHashMap<String, Vec<Checkpoint<S>>>>,
}

impl<S> InMemoryStore<S> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FxHashMap::default()),
        }
    }
}

#[async_trait]
impl<S: GraphState> CheckpointStore<S> for InMemoryStore<S> {
    async fn save(&self, checkpoint: Checkpoint<S>) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let thread = inner.entry(checkpoint.thread_id.clone()).or_default();
        let position = thread
            .iter()
            .position(|existing| existing.version > checkpoint.version)
            .unwrap_or(thread.len());
        thread.insert(position, checkpoint);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Checkpoint<S>>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .values()
            .flat_map(|thread| thread.iter())
            .find(|cp| cp.id == id)
            .cloned())
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint<S>>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.get(thread_id).cloned().unwrap_or_default())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        for thread in inner.values_mut() {
            let before = thread.len();
            thread.retain(|cp| cp.id != id);
            if thread.len() != before {
                return Ok(());
            }
        }
        Err(StoreError::NotFound { id: id.to_string() })
    }

    async fn clear(&self, thread_id: &str) -> Result<(), StoreError> {
        self.inner.write().remove(thread_id);
        Ok(())
    }
}
