//! Control-flow values emitted by nodes to override edge-based routing.
//!
//! A node normally contributes to the next frontier through the graph's
//! static and conditional edges. Returning a [`Command`] instead lets the
//! node carry a state update *and* name its own successors; the executor
//! gives command destinations priority over every edge attached to the
//! node.

use crate::types::NodeId;

/// Node return value that overrides edge-based routing.
///
/// `update` is merged into the state exactly like a plain state return;
/// `goto` replaces the node's contribution to the next frontier. Routing to
/// [`NodeId::End`] terminates the branch.
///
/// # Examples
///
/// ```rust
/// use stepgraph::control::Command;
/// use stepgraph::types::NodeId;
///
/// let cmd: Command<String> = Command::goto("reviewer")
///     .with_update("draft ready".to_string());
/// assert_eq!(cmd.goto, vec![NodeId::named("reviewer")]);
/// ```
#[derive(Clone, Debug)]
pub struct Command<S> {
    /// Optional partial state fed to the merge step.
    pub update: Option<S>,
    /// Destinations forming this node's contribution to the next frontier.
    pub goto: Vec<NodeId>,
}

impl<S> Command<S> {
    /// Command routing to a single destination with no state update.
    #[must_use]
    pub fn goto(target: impl Into<NodeId>) -> Self {
        Self {
            update: None,
            goto: vec![target.into()],
        }
    }

    /// Command fanning out to several destinations.
    #[must_use]
    pub fn goto_all<I, T>(targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
    {
        Self {
            update: None,
            goto: targets.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach a state update to this command.
    #[must_use]
    pub fn with_update(mut self, update: S) -> Self {
        self.update = Some(update);
        self
    }
}
