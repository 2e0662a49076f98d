//! File-backed checkpoint store: one JSON file per checkpoint.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::store::{Checkpoint, CheckpointStore, StoreError};
use crate::types::GraphState;

/// Durable checkpoint store writing one file per checkpoint.
///
/// Files are named `<thread>_<version>_<id>.json` inside the store
/// directory; the index is reconstructed on every operation by listing the
/// directory, parsing the name from the right (the id is a UUID and the
/// version numeric, so threads may contain underscores), and sorting by
/// version.
///
/// # Examples
///
/// ```rust,no_run
/// use stepgraph::checkpoint::FileStore;
/// use stepgraph::schema::MapState;
///
/// let store: FileStore<MapState> = FileStore::new("checkpoints");
/// ```
pub struct FileStore<S> {
    dir: PathBuf,
    _state: PhantomData<fn() -> S>,
}

/// Environment variable naming the checkpoint directory for
/// [`FileStore::from_env`].
pub const CHECKPOINT_DIR_ENV: &str = "STEPGRAPH_CHECKPOINT_DIR";

impl<S> FileStore<S> {
    /// Store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _state: PhantomData,
        }
    }

    /// Store rooted at `$STEPGRAPH_CHECKPOINT_DIR` (with `.env` loaded),
    /// defaulting to `checkpoints`.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let dir =
            std::env::var(CHECKPOINT_DIR_ENV).unwrap_or_else(|_| "checkpoints".to_string());
        Self::new(dir)
    }

    /// The directory backing this store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(checkpoint: &Checkpoint<S>) -> String {
        format!(
            "{}_{}_{}.json",
            checkpoint.thread_id, checkpoint.version, checkpoint.id
        )
    }

    /// Parse `(thread, version, id)` out of a file name, right to left.
    fn parse_name(name: &str) -> Option<(String, u64, String)> {
        let stem = name.strip_suffix(".json")?;
        let mut parts = stem.rsplitn(3, '_');
        let id = parts.next()?.to_string();
        let version: u64 = parts.next()?.parse().ok()?;
        let thread = parts.next()?.to_string();
        Some((thread, version, id))
    }

    async fn entries(&self) -> Result<Vec<(String, u64, String, PathBuf)>, StoreError> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some((thread, version, id)) = Self::parse_name(name) {
                entries.push((thread, version, id, entry.path()));
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl<S> CheckpointStore<S> for FileStore<S>
where
    S: GraphState + Serialize + DeserializeOwned,
{
    async fn save(&self, checkpoint: Checkpoint<S>) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let payload = serde_json::to_vec_pretty(&checkpoint)
            .map_err(|source| StoreError::Serde { source })?;
        let path = self.dir.join(Self::file_name(&checkpoint));
        tokio::fs::write(path, payload).await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Checkpoint<S>>, StoreError> {
        for (_, _, entry_id, path) in self.entries().await? {
            if entry_id == id {
                let bytes = tokio::fs::read(path).await?;
                let checkpoint = serde_json::from_slice(&bytes)
                    .map_err(|source| StoreError::Serde { source })?;
                return Ok(Some(checkpoint));
            }
        }
        Ok(None)
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint<S>>, StoreError> {
        let mut matching: Vec<(u64, PathBuf)> = self
            .entries()
            .await?
            .into_iter()
            .filter(|(thread, _, _, _)| thread == thread_id)
            .map(|(_, version, _, path)| (version, path))
            .collect();
        matching.sort_by_key(|(version, _)| *version);

        let mut checkpoints = Vec::with_capacity(matching.len());
        for (_, path) in matching {
            let bytes = tokio::fs::read(path).await?;
            let checkpoint = serde_json::from_slice(&bytes)
                .map_err(|source| StoreError::Serde { source })?;
            checkpoints.push(checkpoint);
        }
        Ok(checkpoints)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        for (_, _, entry_id, path) in self.entries().await? {
            if entry_id == id {
                tokio::fs::remove_file(path).await?;
                return Ok(());
            }
        }
        Err(StoreError::NotFound { id: id.to_string() })
    }

    async fn clear(&self, thread_id: &str) -> Result<(), StoreError> {
        for (thread, _, _, path) in self.entries().await? {
            if thread == thread_id {
                tokio::fs::remove_file(path).await?;
            }
        }
        Ok(())
    }
}
