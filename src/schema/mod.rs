//! State schemas: how partial updates from concurrent nodes combine into
//! the next-step state.
//!
//! A schema supplies the initial state, the merge rule
//! (`current ⊕ update → next`), and an optional per-superstep cleanup hook.
//! Two implementations ship with the crate:
//!
//! - [`MapSchema`]: an opaque key/value state ([`MapState`]) with per-key
//!   [`Reducer`]s and reference-aliasing protection;
//! - [`RecordSchema`]: struct-like states merged by a caller-supplied
//!   function or an ordered list of per-field rules.
//!
//! Graphs without a schema fall back to a caller-supplied
//! [`StateMerger`], and without either, to last-write-wins.

mod map;
mod record;
mod reducers;

pub use map::{MapSchema, MapState, SharedValue};
pub use record::{field, FieldRule, MergeFn, RecordSchema};
pub use reducers::{
    Append, AppendMessages, KeepCurrent, Max, Min, Overwrite, Reducer, Sum,
};

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

/// Contract between the executor and a state type.
///
/// `apply` must be pure with respect to its inputs; the executor folds the
/// updates of a superstep left-to-right in frontier order, so reducers that
/// are associative make the fold order-insensitive, and non-associative
/// ones still merge reproducibly.
pub trait StateSchema<S>: Send + Sync {
    /// Produce the initial state for a fresh invocation.
    fn init(&self) -> S;

    /// Merge one node's update into the current state.
    fn apply(&self, current: S, update: S) -> Result<S, SchemaError>;

    /// Cleanup hook invoked by the executor after every superstep.
    ///
    /// The default is the identity; [`MapSchema`] uses it to clear
    /// ephemeral keys.
    fn finalize_step(&self, state: S) -> S {
        state
    }
}

/// Merge function used when a graph has no schema: receives the state
/// entering the superstep plus every node result, in frontier order.
pub type StateMerger<S> =
    Arc<dyn Fn(S, Vec<S>) -> Result<S, SchemaError> + Send + Sync>;

/// Errors raised while merging state updates.
#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    /// A reducer rejected its inputs.
    #[error("reducer failed for key `{key}`: {message}")]
    #[diagnostic(
        code(stepgraph::schema::reduce),
        help("Check that the values stored under `{key}` match the reducer's expected shape.")
    )]
    Reduce { key: String, message: String },

    /// Values under a key have incompatible types.
    #[error("type mismatch for key `{key}`: expected {expected}, found {found}")]
    #[diagnostic(code(stepgraph::schema::type_mismatch))]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A custom merge function failed.
    #[error("merge failed: {0}")]
    #[diagnostic(code(stepgraph::schema::merge))]
    Merge(String),
}

/// Human-readable JSON type label, used in mismatch diagnostics.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
