//! Edge types and routing functions for conditional graph flow.

use std::sync::Arc;

use crate::types::NodeId;

/// Routing function for conditional edges.
///
/// Evaluated against the merged state after the source node's superstep;
/// returns exactly one successor (possibly [`NodeId::End`]). When a router
/// is attached to a node it supersedes every static edge out of that node.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use stepgraph::graph::Router;
/// use stepgraph::schema::MapState;
/// use stepgraph::types::NodeId;
///
/// let route_on_flag: Router<MapState> = Arc::new(|state| {
///     if state.get("flag").and_then(|v| v.as_bool()).unwrap_or(false) {
///         NodeId::named("process")
///     } else {
///         NodeId::End
///     }
/// });
/// ```
pub type Router<S> = Arc<dyn Fn(&S) -> NodeId + Send + Sync>;
