//! Graph validation and compilation.

use miette::Diagnostic;
use thiserror::Error;

use super::builder::GraphBuilder;
use crate::runtime::CompiledGraph;
use crate::types::{GraphState, NodeId};

/// Structural validation errors surfaced by [`GraphBuilder::compile`].
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    /// No entry point was set before compilation.
    #[error("no entry point set")]
    #[diagnostic(
        code(stepgraph::graph::missing_entry_point),
        help("Call set_entry_point(name) with the name of a registered node.")
    )]
    MissingEntryPoint,

    /// An edge or entry point references a node that was never registered.
    #[error("unknown node `{name}` referenced by {referenced_by}")]
    #[diagnostic(
        code(stepgraph::graph::unknown_node),
        help("Register `{name}` with add_node before referencing it.")
    )]
    UnknownNode {
        name: String,
        referenced_by: &'static str,
    },

    /// A static edge originates at the terminal endpoint.
    #[error("edge out of the terminal END endpoint")]
    #[diagnostic(
        code(stepgraph::graph::edge_from_end),
        help("END completes a branch; route from a registered node instead.")
    )]
    EdgeFromEnd,
}

impl<S: GraphState> GraphBuilder<S> {
    /// Validate the graph and freeze it into an executable
    /// [`CompiledGraph`].
    ///
    /// # Errors
    ///
    /// - [`GraphError::MissingEntryPoint`] when no entry point was set;
    /// - [`GraphError::UnknownNode`] when the entry point, a static edge
    ///   endpoint, or a conditional-edge source names an unregistered node;
    /// - [`GraphError::EdgeFromEnd`] when a static edge leaves the terminal.
    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        let entry_point = self.entry_point.clone().ok_or(GraphError::MissingEntryPoint)?;
        self.require_registered(&entry_point, "the entry point")?;

        for (from, targets) in &self.edges {
            if from.is_end() {
                return Err(GraphError::EdgeFromEnd);
            }
            self.require_registered(from, "a static edge source")?;
            for to in targets {
                if !to.is_end() {
                    self.require_registered(to, "a static edge target")?;
                }
            }
        }
        for from in self.routers.keys() {
            self.require_registered(from, "a conditional edge source")?;
        }

        tracing::debug!(
            nodes = self.nodes.len(),
            edges = self.edge_count(),
            entry = %entry_point,
            "graph compiled"
        );

        Ok(CompiledGraph::from_parts(
            self.nodes,
            self.edges,
            self.routers,
            entry_point,
            self.schema,
            self.merger,
            self.retry_policy,
        ))
    }

    fn require_registered(&self, id: &NodeId, referenced_by: &'static str) -> Result<(), GraphError> {
        if id.is_end() || self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode {
                name: id.encode(),
                referenced_by,
            })
        }
    }
}
