//! Graph execution runtime: the superstep executor, run configuration, and
//! retry policy.
//!
//! [`CompiledGraph`] is the runnable produced by
//! [`GraphBuilder::compile`](crate::graph::GraphBuilder::compile). Each
//! invocation drives the superstep loop under a [`RunConfig`]; controlled
//! stops surface as [`GraphInterrupt`] envelopes inside
//! [`ExecutorError::Interrupted`].

mod config;
mod executor;
mod retry;

pub use config::{RunConfig, CHECKPOINT_ID_KEY, THREAD_ID_KEY};
pub use executor::{CompiledGraph, ExecutorError, GraphInterrupt};
pub use retry::{Backoff, RetryPolicy};

pub(crate) use executor::StepObserver;
