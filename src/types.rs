//! Core identifier types for the stepgraph workflow engine.
//!
//! This module defines the fundamental vocabulary used throughout the crate:
//! [`NodeId`] names the vertices of a workflow graph, and [`GraphState`] is
//! the blanket bound every state type must satisfy to flow through the
//! executor.
//!
//! # Examples
//!
//! ```rust
//! use stepgraph::types::NodeId;
//!
//! let worker = NodeId::named("worker");
//! let end = NodeId::End;
//!
//! assert_eq!(worker.encode(), "worker");
//! assert_eq!(end.encode(), "END");
//! assert_eq!(NodeId::decode("END"), NodeId::End);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within a workflow graph.
///
/// Every executable node carries a unique caller-chosen name. The reserved
/// terminal [`End`](Self::End) marks the exit of a workflow branch; it is a
/// virtual endpoint, never registered or executed, and is stripped from the
/// frontier by the executor.
///
/// # Persistence
///
/// `NodeId` supports serde for checkpointing plus a human-readable
/// [`encode`](Self::encode)/[`decode`](Self::decode) string form (`"END"`
/// for the terminal, the plain name otherwise).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    /// Terminal endpoint that completes a workflow branch.
    ///
    /// `End` has no outgoing edges and no implementation; routing to it
    /// signals that the branch is finished.
    End,

    /// An executable node identified by a caller-chosen name.
    Named(String),
}

/// String form of the reserved terminal endpoint.
pub const END: &str = "END";

impl NodeId {
    /// Creates a named node identifier.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        NodeId::Named(name.into())
    }

    /// Encode this identifier into its persisted string form.
    ///
    /// `End` encodes as `"END"`; named nodes encode as their name.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeId::End => END.to_string(),
            NodeId::Named(name) => name.clone(),
        }
    }

    /// Decode a persisted string form back into a `NodeId`.
    pub fn decode(s: &str) -> Self {
        if s == END {
            NodeId::End
        } else {
            NodeId::Named(s.to_string())
        }
    }

    /// Returns `true` if this is the terminal [`End`](Self::End) endpoint.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Returns the node name, or `None` for the terminal endpoint.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeId::End => None,
            NodeId::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::End => write!(f, "{END}"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

// Developer experience: allow string literals where a NodeId is expected.
impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::decode(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId::decode(&s)
    }
}

/// Blanket bound satisfied by every state type the engine can execute over.
///
/// The engine is generic over the caller's state; this alias collects the
/// bounds the executor needs (cloning for per-node snapshots, `Debug` for
/// diagnostics, and thread-safety for concurrent supersteps). Any type
/// meeting the bounds implements `GraphState` automatically.
pub trait GraphState: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> GraphState for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let id = NodeId::named("planner");
        assert_eq!(NodeId::decode(&id.encode()), id);
        assert_eq!(NodeId::decode(&NodeId::End.encode()), NodeId::End);
    }

    #[test]
    fn from_str_recognizes_terminal() {
        assert_eq!(NodeId::from("END"), NodeId::End);
        assert_eq!(NodeId::from("worker"), NodeId::named("worker"));
    }

    #[test]
    fn display_matches_encoding() {
        assert_eq!(NodeId::named("a").to_string(), "a");
        assert_eq!(NodeId::End.to_string(), "END");
    }
}
