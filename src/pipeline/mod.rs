// src/pipeline/mod.rs

//! Feature entry points built on the batch core.
//!
//! - `run_keyword_volumes` / `run_category_lookup`: per-keyword lookups
//! - `run_product_collection`: listings per keyword, merged by title
//! - `run_cafe_crawl`: page-by-page member extraction
//! - `run_bid_analysis`: search-ad statistics and bid ladders per keyword
//! - `run_rank_check`: one product's position for each keyword

pub mod bids;
pub mod cafe;
pub mod keywords;
pub mod products;
pub mod ranks;

pub use bids::run_bid_analysis;
pub use cafe::{CafeCrawl, merge_members, run_cafe_crawl};
pub use keywords::{run_category_lookup, run_keyword_volumes};
pub use products::{ProductCollection, merge_products, run_product_collection};
pub use ranks::run_rank_check;

use std::sync::Arc;

use crate::batch::{BatchProcessor, CancellationToken, RateLimiterRegistry, RetryPolicy};
use crate::error::Result;
use crate::models::{Config, FeatureConfig};

/// Shared state for every feature run started by one caller.
#[derive(Clone)]
pub struct RunContext {
    pub config: Arc<Config>,
    pub token: CancellationToken,
    pub limiters: Arc<RateLimiterRegistry>,
}

impl RunContext {
    /// Context backed by the process-wide limiter registry.
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, RateLimiterRegistry::global())
    }

    pub fn with_registry(config: Config, limiters: Arc<RateLimiterRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            token: CancellationToken::new(),
            limiters,
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Processor for one feature: its worker count, its resource's limiter,
    /// and this context's token.
    pub fn processor<T: Send + 'static>(
        &self,
        name: &str,
        feature: &FeatureConfig,
    ) -> Result<BatchProcessor<T>> {
        let limiter = self.limiters.for_resource(&feature.resource, &self.config)?;
        Ok(BatchProcessor::new(self.config.workers_for(feature))?
            .with_limiter(limiter)
            .with_token(self.token.clone())
            .with_label(name))
    }

    /// Retry policy applied inside handlers.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }
}
