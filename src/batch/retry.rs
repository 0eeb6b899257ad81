//! Failure taxonomy and retry policy.
//!
//! Retries happen *inside* a single item's handler. The worker pool never
//! retries on its own, so backoff here never compounds with pool throttling.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::CancellationToken;
use crate::error::{AppError, Result};
use crate::models::RetryConfig;

/// How a failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeouts, 5xx, connection resets.
    Transient,
    /// HTTP 429 or an equivalent vendor signal.
    RateLimited,
    /// Auth failures, malformed requests, other 4xx.
    Fatal,
    /// A stop was requested; reported as a skip rather than a failure.
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors that can place themselves in the taxonomy.
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    /// Server-requested delay before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limited_base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            rate_limited_base_delay: Duration::from_millis(config.rate_limited_base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Decide whether the zero-based `attempt` that just failed with `kind`
    /// should be retried, and after how long.
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> Option<Duration> {
        let base = match kind {
            ErrorKind::Transient => self.base_delay,
            ErrorKind::RateLimited => self.rate_limited_base_delay,
            ErrorKind::Fatal | ErrorKind::Cancelled => return None,
        };
        if attempt.saturating_add(1) >= self.max_attempts {
            return None;
        }
        Some(self.backoff(base, attempt))
    }

    fn backoff(&self, base: Duration, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        base.checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails fatally, exhausts its attempts, or a
    /// stop is requested.
    ///
    /// `op` receives the zero-based attempt number. The token is checked
    /// before every attempt and raced against every backoff sleep.
    pub async fn run<T, F, Fut>(&self, token: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            if token.is_stop_requested() {
                return Err(AppError::Cancelled);
            }

            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let Some(backoff) = self.should_retry(attempt, error.kind()) else {
                return Err(error);
            };
            let delay = match error.retry_after() {
                Some(requested) => backoff.max(requested).min(self.max_delay),
                None => backoff,
            };

            log::warn!(
                "Attempt {}/{} failed ({}): {}. Retrying in {:?}",
                attempt + 1,
                self.max_attempts,
                error.kind(),
                error,
                delay
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => return Err(AppError::Cancelled),
            }
            attempt += 1;
        }
    }
}
