//! Versioned per-thread state persistence.
//!
//! [`CheckpointStore`] is the pluggable persistence contract; the crate
//! ships an [`InMemoryStore`] for tests and ephemeral runs plus a
//! [`FileStore`] writing one JSON file per checkpoint.
//! [`CheckpointRunner`] wraps a compiled graph with automatic per-superstep
//! saves, state inspection, human-in-the-loop updates, and the resume
//! protocol.

mod file;
mod memory;
mod runner;
mod store;

pub use file::{FileStore, CHECKPOINT_DIR_ENV};
pub use memory::InMemoryStore;
pub use runner::{CheckpointError, CheckpointRunner, ResumeError, StateInfo};
pub use store::{
    Checkpoint, CheckpointStore, StoreError, EVENT_INTERRUPT, EVENT_KEY, EVENT_MANUAL_SAVE,
    EVENT_STEP, EVENT_UPDATE_STATE, UPDATED_BY_KEY,
};
