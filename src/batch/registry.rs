//! Named rate limiters, one per downstream resource.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::batch::{AdaptiveRateLimiter, RateLimiter, Throttle};
use crate::error::Result;
use crate::models::{Config, RateLimitConfig};

/// Lazily populated map from resource name to its limiter.
///
/// Every caller asking for the same name shares one limiter, so batches
/// hitting the same API from different features are spaced together.
#[derive(Default)]
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<String, Arc<dyn Throttle>>>,
}

static GLOBAL: OnceLock<Arc<RateLimiterRegistry>> = OnceLock::new();

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry. Lives until the process exits.
    pub fn global() -> Arc<RateLimiterRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(RateLimiterRegistry::new())))
    }

    /// Return the limiter for `name`, creating it from `config` on first use.
    ///
    /// Later calls return the existing limiter even if `config` differs.
    pub fn get_or_create(&self, name: &str, config: &RateLimitConfig) -> Result<Arc<dyn Throttle>> {
        let mut limiters = self.limiters.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = limiters.get(name) {
            return Ok(Arc::clone(existing));
        }

        let limiter: Arc<dyn Throttle> = if config.adaptive {
            Arc::new(AdaptiveRateLimiter::from_rate(config.calls_per_second)?)
        } else {
            Arc::new(RateLimiter::new(config.calls_per_second)?)
        };
        log::debug!(
            "Created {} limiter '{}' at {} calls/s",
            if config.adaptive { "adaptive" } else { "fixed" },
            name,
            config.calls_per_second
        );
        limiters.insert(name.to_string(), Arc::clone(&limiter));
        Ok(limiter)
    }

    /// Limiter for `name` using the rate configured in `config`, or the
    /// default rate when the resource is not listed.
    pub fn for_resource(&self, name: &str, config: &Config) -> Result<Arc<dyn Throttle>> {
        let rate = config.rate_limits.get(name).cloned().unwrap_or_else(|| {
            log::warn!("No rate limit configured for '{name}', using default");
            RateLimitConfig::default()
        });
        self.get_or_create(name, &rate)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Throttle>> {
        self.limiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.limiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
