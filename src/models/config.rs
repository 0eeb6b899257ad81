//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Per-item retry behavior
    #[serde(default)]
    pub retry: RetryConfig,

    /// Rate limits keyed by downstream resource name
    #[serde(default = "defaults::rate_limits")]
    pub rate_limits: BTreeMap<String, RateLimitConfig>,

    /// Per-feature resource and concurrency settings
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Product-name collection settings
    #[serde(default)]
    pub products: ProductsConfig,

    /// Cafe page crawl settings
    #[serde(default)]
    pub cafe: CafeConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Override selected values from the process environment.
    ///
    /// Recognized: `MAX_WORKERS`, `RETRY_MAX_ATTEMPTS`, `RETRY_BASE_DELAY_MS`.
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            let parsed = raw.trim().parse().ok();
            if parsed.is_none() {
                log::warn!("Ignoring {key}={raw:?}: not a valid number");
            }
            parsed
        }

        if let Some(n) = parse("MAX_WORKERS", lookup("MAX_WORKERS")) {
            self.pool.max_workers = n;
        }
        if let Some(n) = parse("RETRY_MAX_ATTEMPTS", lookup("RETRY_MAX_ATTEMPTS")) {
            self.retry.max_attempts = n;
        }
        if let Some(ms) = parse("RETRY_BASE_DELAY_MS", lookup("RETRY_BASE_DELAY_MS")) {
            self.retry.base_delay_ms = ms;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_workers == 0 {
            return Err(AppError::validation("pool.max_workers must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::validation("retry.max_attempts must be > 0"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(AppError::validation(
                "retry.base_delay_ms must not exceed retry.max_delay_ms",
            ));
        }
        for (name, limit) in &self.rate_limits {
            if !limit.calls_per_second.is_finite() || limit.calls_per_second <= 0.0 {
                return Err(AppError::validation(format!(
                    "rate_limits.{name}.calls_per_second must be > 0"
                )));
            }
        }
        for (name, feature) in self.features.iter() {
            if feature.resource.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "features.{name}.resource is empty"
                )));
            }
            if feature.max_workers == Some(0) {
                return Err(AppError::validation(format!(
                    "features.{name}.max_workers must be > 0"
                )));
            }
        }
        if self.products.max_per_keyword == 0 {
            return Err(AppError::validation("products.max_per_keyword must be > 0"));
        }
        if self.cafe.start_page == 0 || self.cafe.start_page > self.cafe.end_page {
            return Err(AppError::validation(
                "cafe pages must satisfy 1 <= start_page <= end_page",
            ));
        }
        Ok(())
    }

    /// Worker count for `feature`, falling back to the pool default.
    pub fn workers_for(&self, feature: &FeatureConfig) -> usize {
        feature.max_workers.unwrap_or(self.pool.max_workers)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            rate_limits: defaults::rate_limits(),
            features: FeaturesConfig::default(),
            products: ProductsConfig::default(),
            cafe: CafeConfig::default(),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Default number of concurrent workers per batch
    #[serde(default = "defaults::max_workers")]
    pub max_workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: defaults::max_workers(),
        }
    }
}

/// Retry settings applied inside handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base backoff for transient failures
    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    /// Base backoff after a rate-limit signal
    #[serde(default = "defaults::rate_limited_base_delay")]
    pub rate_limited_base_delay_ms: u64,

    /// Upper bound for any single backoff
    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay(),
            rate_limited_base_delay_ms: defaults::rate_limited_base_delay(),
            max_delay_ms: defaults::max_delay(),
        }
    }
}

/// Rate limit for one downstream resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "defaults::calls_per_second")]
    pub calls_per_second: f64,

    /// Let the spacing follow downstream feedback
    #[serde(default)]
    pub adaptive: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_second: defaults::calls_per_second(),
            adaptive: false,
        }
    }
}

/// Settings for one orchestrated feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Rate limiter name shared with other features hitting the same API
    pub resource: String,

    /// Concurrency override; `None` uses `pool.max_workers`
    #[serde(default)]
    pub max_workers: Option<usize>,
}

impl FeatureConfig {
    fn new(resource: &str, max_workers: usize) -> Self {
        Self {
            resource: resource.to_string(),
            max_workers: Some(max_workers),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "defaults::keyword_volume")]
    pub keyword_volume: FeatureConfig,

    #[serde(default = "defaults::category")]
    pub category: FeatureConfig,

    #[serde(default = "defaults::product_names")]
    pub product_names: FeatureConfig,

    #[serde(default = "defaults::cafe_pages")]
    pub cafe_pages: FeatureConfig,

    #[serde(default = "defaults::ad_bids")]
    pub ad_bids: FeatureConfig,

    #[serde(default = "defaults::rank_check")]
    pub rank_check: FeatureConfig,
}

impl FeaturesConfig {
    /// Features with their config key.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FeatureConfig)> {
        [
            ("keyword_volume", &self.keyword_volume),
            ("category", &self.category),
            ("product_names", &self.product_names),
            ("cafe_pages", &self.cafe_pages),
            ("ad_bids", &self.ad_bids),
            ("rank_check", &self.rank_check),
        ]
        .into_iter()
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            keyword_volume: defaults::keyword_volume(),
            category: defaults::category(),
            product_names: defaults::product_names(),
            cafe_pages: defaults::cafe_pages(),
            ad_bids: defaults::ad_bids(),
            rank_check: defaults::rank_check(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductsConfig {
    /// Listings collected per keyword
    #[serde(default = "defaults::max_per_keyword")]
    pub max_per_keyword: usize,
}

impl Default for ProductsConfig {
    fn default() -> Self {
        Self {
            max_per_keyword: defaults::max_per_keyword(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CafeConfig {
    #[serde(default = "defaults::start_page")]
    pub start_page: u32,

    /// Inclusive
    #[serde(default = "defaults::end_page")]
    pub end_page: u32,
}

impl CafeConfig {
    pub fn pages(&self) -> std::ops::RangeInclusive<u32> {
        self.start_page..=self.end_page
    }
}

impl Default for CafeConfig {
    fn default() -> Self {
        Self {
            start_page: defaults::start_page(),
            end_page: defaults::end_page(),
        }
    }
}

/// Default configuration values.
mod defaults {
    use std::collections::BTreeMap;

    use super::{FeatureConfig, RateLimitConfig};

    pub const KEYWORD_API: &str = "keyword-volume-api";
    pub const SHOPPING_API: &str = "shopping-api";
    pub const CAFE_PAGES: &str = "cafe-pages";
    pub const AD_BIDS_API: &str = "ad-bids-api";

    // Pool
    pub fn max_workers() -> usize {
        3
    }

    // Retry
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn base_delay() -> u64 {
        1000
    }
    pub fn rate_limited_base_delay() -> u64 {
        2000
    }
    pub fn max_delay() -> u64 {
        30_000
    }

    // Rate limits
    pub fn calls_per_second() -> f64 {
        1.0
    }
    pub fn rate_limits() -> BTreeMap<String, RateLimitConfig> {
        [
            (KEYWORD_API, 2.0, false),
            (SHOPPING_API, 5.0, false),
            (CAFE_PAGES, 0.5, false),
            // Starts at one call per second, backs off on 429s.
            (AD_BIDS_API, 1.0, true),
        ]
        .into_iter()
        .map(|(name, calls_per_second, adaptive)| {
            (
                name.to_string(),
                RateLimitConfig {
                    calls_per_second,
                    adaptive,
                },
            )
        })
        .collect()
    }

    // Features
    pub fn keyword_volume() -> FeatureConfig {
        FeatureConfig::new(KEYWORD_API, 3)
    }
    pub fn category() -> FeatureConfig {
        FeatureConfig::new(KEYWORD_API, 3)
    }
    pub fn product_names() -> FeatureConfig {
        FeatureConfig::new(SHOPPING_API, 2)
    }
    pub fn cafe_pages() -> FeatureConfig {
        FeatureConfig::new(CAFE_PAGES, 1)
    }
    pub fn ad_bids() -> FeatureConfig {
        FeatureConfig::new(AD_BIDS_API, 3)
    }
    pub fn rank_check() -> FeatureConfig {
        FeatureConfig::new(SHOPPING_API, 3)
    }

    // Products
    pub fn max_per_keyword() -> usize {
        40
    }

    // Cafe
    pub fn start_page() -> u32 {
        1
    }
    pub fn end_page() -> u32 {
        10
    }
}
