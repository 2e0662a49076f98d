//! Retry policy for node execution.

use std::time::Duration;

use crate::node::NodeError;

/// Backoff strategy between retry attempts, on a 1-second base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Wait the base delay between every attempt.
    Fixed,
    /// Wait `attempt * base`.
    Linear,
    /// Wait `base * 2^(attempt - 1)`.
    Exponential,
}

/// Retry policy applied to every node execution in a graph.
///
/// A node is attempted up to `max_retries + 1` times. An error is retryable
/// iff its rendered message contains one of the `retry_on` substrings; with
/// an empty list nothing is retried. The dynamic-interrupt sentinel is
/// never retried regardless of policy.
///
/// # Examples
///
/// ```rust
/// use stepgraph::runtime::{Backoff, RetryPolicy};
///
/// let policy = RetryPolicy::new(3, Backoff::Exponential)
///     .retry_on("connection reset")
///     .retry_on("rate limit");
/// assert_eq!(policy.delay(2), std::time::Duration::from_secs(2));
/// ```
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Number of re-attempts after the first failure.
    pub max_retries: u32,
    /// Delay strategy between attempts.
    pub backoff: Backoff,
    /// Substrings identifying retryable errors.
    pub retry_on: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff::Fixed,
            retry_on: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Base delay the backoff strategies scale from.
    pub const BASE_DELAY: Duration = Duration::from_secs(1);

    /// Policy with the given retry budget and backoff strategy.
    #[must_use]
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
            retry_on: Vec::new(),
        }
    }

    /// Add a substring identifying retryable errors.
    #[must_use]
    pub fn retry_on(mut self, pattern: impl Into<String>) -> Self {
        self.retry_on.push(pattern.into());
        self
    }

    /// Delay before the next attempt, given the 1-based attempt that just
    /// failed.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Fixed => Self::BASE_DELAY,
            Backoff::Linear => Self::BASE_DELAY * attempt,
            Backoff::Exponential => Self::BASE_DELAY * 2u32.saturating_pow(attempt - 1),
        }
    }

    /// Whether the policy considers this error retryable.
    #[must_use]
    pub fn is_retryable(&self, error: &NodeError) -> bool {
        if error.is_interrupt() {
            return false;
        }
        let rendered = error.to_string();
        self.retry_on.iter().any(|pattern| rendered.contains(pattern))
    }
}
