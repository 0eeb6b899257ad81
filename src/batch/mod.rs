//! Bounded-concurrency batch execution.
//!
//! - [`BatchProcessor`]: fans work items out to a fixed worker pool
//! - [`RateLimiter`] / [`AdaptiveRateLimiter`]: spacing between downstream calls
//! - [`RetryPolicy`]: per-item retry with exponential backoff
//! - [`CancellationToken`]: cooperative stop signal
//! - [`ResultAggregator`]: outcome bookkeeping and summary statistics
//! - [`ProgressSink`]: streaming of per-item and aggregate progress

mod aggregator;
mod cancel;
mod limiter;
mod processor;
mod registry;
mod retry;
mod sink;

pub use aggregator::{BatchResult, LOST_ITEM_MESSAGE, ResultAggregator, Summary};
pub use cancel::CancellationToken;
pub use limiter::{AdaptiveRateLimiter, RateLimiter, Throttle};
pub use processor::BatchProcessor;
pub use registry::RateLimiterRegistry;
pub use retry::{Classify, ErrorKind, RetryPolicy};
pub use sink::{BatchEvent, Callbacks, ChannelSink, LogSink, ProgressSink};

use serde::Serialize;

/// An input value tagged with its submission index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<T> {
    pub index: usize,
    pub value: T,
}

/// Result of processing one work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<R> {
    Success { value: R },
    Failure { kind: ErrorKind, message: String },
    /// Never started because a stop was requested.
    Skipped,
}

impl<R> Outcome<R> {
    pub fn success(value: R) -> Self {
        Self::Success { value }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Borrow the success value, if any.
    pub fn value(&self) -> Option<&R> {
        match self {
            Self::Success { value } => Some(value),
            _ => None,
        }
    }

    /// Take the success value, if any.
    pub fn into_value(self) -> Option<R> {
        match self {
            Self::Success { value } => Some(value),
            _ => None,
        }
    }
}

/// Aggregate progress after an outcome has been recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub label: String,
}

impl ProgressEvent {
    /// Completion ratio in percent.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }

    pub fn is_final(&self) -> bool {
        self.completed == self.total
    }
}
