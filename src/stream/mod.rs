//! Real-time event streaming over a running invocation.
//!
//! [`CompiledGraph::stream`] installs a temporary global listener that
//! forwards lifecycle events into a bounded channel, spawns the invocation,
//! and hands back a [`StreamHandle`] with four channels (events, the final
//! result, the error, and a done signal) plus a cancel hook.
//!
//! Backpressure is non-blocking by default: when the event channel is full
//! the event is dropped and a counter increments. Termination fences the
//! `closed` flag before any channel is closed, so late notifications are
//! discarded without a write attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::listener::{Listener, StreamEvent, StreamEventKind};
use crate::runtime::{CompiledGraph, ExecutorError, RunConfig};
use crate::types::GraphState;

/// Filter deciding which event kinds reach the stream consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// Node updates: `node_complete` and `chain_end`.
    Updates,
    /// Full state snapshots: `node_complete` and `chain_end`.
    Values,
    /// LLM traffic only: `llm_start`, `llm_end`, `token`.
    Messages,
    /// Every event.
    Debug,
}

impl StreamMode {
    /// Whether this mode lets an event kind through.
    #[must_use]
    pub fn admits(&self, kind: StreamEventKind) -> bool {
        match self {
            Self::Updates | Self::Values => matches!(
                kind,
                StreamEventKind::NodeComplete | StreamEventKind::ChainEnd
            ),
            Self::Messages => kind.is_llm(),
            Self::Debug => true,
        }
    }
}

/// Options for a streamed invocation.
#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Event filter.
    pub mode: StreamMode,
    /// Event channel capacity.
    pub buffer: usize,
    /// When `true` (the default), a full channel drops the event and
    /// increments the drop counter; when `false` the producer side waits
    /// for capacity.
    pub drop_when_full: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            mode: StreamMode::Updates,
            buffer: 1024,
            drop_when_full: true,
        }
    }
}

#[derive(Default)]
struct StreamStats {
    closed: bool,
    dropped: u64,
}

/// Bookkeeping shared between the streaming listener and the handle.
///
/// The `closed` flag and the drop counter live under one lock so that
/// termination can fence the flag before the channels close.
struct StreamShared {
    stats: Mutex<StreamStats>,
}

/// Handle over a streamed invocation.
///
/// Channels close in the order `events`, `result`, `errors`, `done`.
/// Errors are delivered exclusively on `errors`; a successful run delivers
/// exactly one value on `result`. `done` yields one unit either way.
pub struct StreamHandle<S> {
    /// Filtered lifecycle events.
    pub events: flume::Receiver<StreamEvent<S>>,
    /// The final state, on success.
    pub result: flume::Receiver<S>,
    /// The invocation error (including interrupts), on failure.
    pub errors: flume::Receiver<ExecutorError<S>>,
    /// Completion signal, sent after every other channel closed.
    pub done: flume::Receiver<()>,
    cancel: watch::Sender<bool>,
    shared: Arc<StreamShared>,
}

impl<S: GraphState> StreamHandle<S> {
    /// Cancel the running invocation.
    ///
    /// Cancellation is cooperative: in-flight nodes finish, retry waits are
    /// cut short, and no further superstep is scheduled.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Number of events dropped due to a full channel. Non-decreasing.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.shared.stats.lock().dropped
    }
}

/// Global listener forwarding filtered events into the stream channel.
struct StreamingListener<S> {
    mode: StreamMode,
    drop_when_full: bool,
    tx: flume::Sender<StreamEvent<S>>,
    shared: Arc<StreamShared>,
}

#[async_trait]
impl<S: GraphState> Listener<S> for StreamingListener<S> {
    async fn on_event(&self, event: StreamEvent<S>) {
        if !self.mode.admits(event.kind) {
            return;
        }
        {
            let stats = self.shared.stats.lock();
            if stats.closed {
                return;
            }
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(event)) => {
                if self.drop_when_full {
                    let mut stats = self.shared.stats.lock();
                    stats.dropped += 1;
                    tracing::debug!(total_dropped = stats.dropped, "event stream full; dropped");
                } else {
                    let _ = self.tx.send_async(event).await;
                }
            }
            Err(flume::TrySendError::Disconnected(_)) => {}
        }
    }
}

impl<S: GraphState> CompiledGraph<S> {
    /// Stream an invocation with default configuration and options.
    #[must_use]
    pub fn stream(&self, initial: S) -> StreamHandle<S> {
        self.stream_with_config(initial, RunConfig::default(), StreamOptions::default())
    }

    /// Stream an invocation under a run configuration and stream options.
    ///
    /// A temporary global listener feeds the event channel for the duration
    /// of the run and is removed on termination. An existing cancellation
    /// signal on the configuration is forwarded into the handle's internal
    /// one, so both the caller's signal and [`StreamHandle::cancel`] work.
    #[must_use]
    pub fn stream_with_config(
        &self,
        initial: S,
        mut config: RunConfig<S>,
        options: StreamOptions,
    ) -> StreamHandle<S> {
        let (events_tx, events_rx) = flume::bounded(options.buffer);
        let (result_tx, result_rx) = flume::bounded(1);
        let (errors_tx, errors_rx) = flume::bounded(1);
        let (done_tx, done_rx) = flume::bounded(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let shared = Arc::new(StreamShared {
            stats: Mutex::new(StreamStats::default()),
        });

        // Forward a caller-supplied cancellation signal into the internal one.
        if let Some(mut outer) = config.cancellation.take() {
            let cancel_tx = cancel_tx.clone();
            tokio::spawn(async move {
                while outer.changed().await.is_ok() {
                    if *outer.borrow() {
                        let _ = cancel_tx.send(true);
                        break;
                    }
                }
            });
        }
        config.cancellation = Some(cancel_rx);

        let listener: Arc<dyn Listener<S>> = Arc::new(StreamingListener {
            mode: options.mode,
            drop_when_full: options.drop_when_full,
            tx: events_tx,
            shared: Arc::clone(&shared),
        });
        let listener_id = self.add_listener(listener);

        let graph = self.clone();
        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let outcome = graph.invoke_with_config(initial, config).await;

            // Fence the closed flag before any channel closes; events
            // arriving afterwards are discarded without a write attempt.
            task_shared.stats.lock().closed = true;
            graph.remove_listener(&listener_id);
            tokio::time::sleep(Duration::from_millis(20)).await;

            // The events sender lives inside the removed listener; dropping
            // the listener registration above released the last producer.
            match outcome {
                Ok(state) => {
                    let _ = result_tx.try_send(state);
                }
                Err(err) => {
                    let _ = errors_tx.try_send(err);
                }
            }
            drop(result_tx);
            drop(errors_tx);
            let _ = done_tx.try_send(());
        });

        StreamHandle {
            events: events_rx,
            result: result_rx,
            errors: errors_rx,
            done: done_rx,
            cancel: cancel_tx,
            shared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_filters() {
        assert!(StreamMode::Updates.admits(StreamEventKind::NodeComplete));
        assert!(StreamMode::Updates.admits(StreamEventKind::ChainEnd));
        assert!(!StreamMode::Updates.admits(StreamEventKind::NodeStart));
        assert!(StreamMode::Messages.admits(StreamEventKind::Token));
        assert!(!StreamMode::Messages.admits(StreamEventKind::NodeComplete));
        assert!(StreamMode::Debug.admits(StreamEventKind::Custom));
    }
}
