//! Graph definition and compilation.
//!
//! [`GraphBuilder`] accumulates nodes, static edges, conditional routers,
//! the entry point, and the merge machinery, then compiles into an
//! executable [`CompiledGraph`](crate::runtime::CompiledGraph). Topology is
//! expressed entirely through node names, avoiding cyclic object graphs and
//! lifetimes threading through the structure.

mod builder;
mod compilation;
mod edges;

pub use builder::GraphBuilder;
pub use compilation::GraphError;
pub use edges::Router;
