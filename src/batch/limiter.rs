//! Minimum-interval rate limiting shared across workers.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{AppError, Result};

/// Gate placed in front of a shared downstream resource.
///
/// The feedback hooks let adaptive implementations react to how calls went;
/// fixed-rate limiters ignore them.
#[async_trait]
pub trait Throttle: Send + Sync {
    /// Block until the next call may start.
    async fn wait(&self);

    fn on_success(&self) {}

    fn on_rate_limited(&self, _retry_after: Option<Duration>) {}

    fn on_error(&self) {}

    /// Current spacing between calls.
    fn interval(&self) -> Duration;
}

/// Fixed minimum-interval limiter.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    // Held across the sleep: "read last, sleep, write last" must not interleave.
    last_call: tokio::sync::Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `calls_per_second` calls per second.
    pub fn new(calls_per_second: f64) -> Result<Self> {
        if !calls_per_second.is_finite() || calls_per_second <= 0.0 {
            return Err(AppError::config(format!(
                "calls_per_second must be a positive number, got {calls_per_second}"
            )));
        }
        Ok(Self::with_interval(Duration::from_secs_f64(
            1.0 / calls_per_second,
        )))
    }

    /// Create a limiter allowing `requests_per_minute` calls per minute.
    pub fn per_minute(requests_per_minute: f64) -> Result<Self> {
        Self::new(requests_per_minute / 60.0)
    }

    /// Create a limiter with an explicit minimum interval.
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: tokio::sync::Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[async_trait]
impl Throttle for RateLimiter {
    async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                log::debug!(
                    "Rate limiting: waiting {:?}",
                    ready_at.saturating_duration_since(Instant::now())
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn interval(&self) -> Duration {
        self.min_interval
    }
}

/// Limiter whose interval follows downstream feedback.
///
/// Three consecutive successes shrink the delay by 10%. A rate-limit signal
/// doubles it, or adopts the server's `Retry-After` when one is given.
/// Repeated generic errors grow it by half. The delay always stays within
/// `[min, max]`, so a `Retry-After` outside that range is clamped to it.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    min_delay: Duration,
    max_delay: Duration,
    state: Mutex<AdaptiveState>,
    last_call: tokio::sync::Mutex<Option<Instant>>,
}

#[derive(Debug)]
struct AdaptiveState {
    delay: Duration,
    successes: u32,
    errors: u32,
}

const SUCCESS_STREAK: u32 = 3;
const ERROR_STREAK: u32 = 2;

impl AdaptiveRateLimiter {
    pub fn new(initial: Duration, min_delay: Duration, max_delay: Duration) -> Result<Self> {
        if min_delay > max_delay {
            return Err(AppError::config(format!(
                "adaptive limiter min delay {min_delay:?} exceeds max delay {max_delay:?}"
            )));
        }
        Ok(Self {
            min_delay,
            max_delay,
            state: Mutex::new(AdaptiveState {
                delay: initial.clamp(min_delay, max_delay),
                successes: 0,
                errors: 0,
            }),
            last_call: tokio::sync::Mutex::new(None),
        })
    }

    /// Start at `1 / calls_per_second`, allow halving it and growing up to 10s.
    pub fn from_rate(calls_per_second: f64) -> Result<Self> {
        let base = RateLimiter::new(calls_per_second)?.min_interval();
        let max = base.max(Duration::from_secs(10));
        Self::new(base, base / 2, max)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, AdaptiveState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_delay(&self, state: &mut AdaptiveState, delay: Duration) {
        state.delay = delay.clamp(self.min_delay, self.max_delay);
    }
}

#[async_trait]
impl Throttle for AdaptiveRateLimiter {
    async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval();
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn on_success(&self) {
        let mut state = self.state();
        state.errors = 0;
        state.successes += 1;
        if state.successes >= SUCCESS_STREAK {
            let delay = state.delay * 9 / 10;
            self.set_delay(&mut state, delay);
            state.successes = 0;
        }
    }

    /// A server-requested delay replaces the current one, clamped into
    /// `[min_delay, max_delay]`. A short `Retry-After` can therefore lower the
    /// delay, but never below `min_delay`.
    fn on_rate_limited(&self, retry_after: Option<Duration>) {
        let mut state = self.state();
        state.successes = 0;
        state.errors += 1;
        let delay = retry_after.unwrap_or(state.delay * 2);
        self.set_delay(&mut state, delay);
        log::warn!("Rate limit hit: delay raised to {:?}", state.delay);
    }

    fn on_error(&self) {
        let mut state = self.state();
        state.successes = 0;
        state.errors += 1;
        if state.errors >= ERROR_STREAK {
            let delay = state.delay * 3 / 2;
            self.set_delay(&mut state, delay);
        }
    }

    fn interval(&self) -> Duration {
        self.state().delay
    }
}
