// src/models/mod.rs

//! Domain models for the orchestrator.
//!
//! Configuration lives in [`config`]; the remaining modules hold the records
//! produced by each orchestrated feature.

mod bids;
mod cafe;
mod config;
mod keyword;
mod product;
mod rank;

// Re-export all public types
pub use bids::{BidAnalysis, BidPosition, Device, KeywordBasics};
pub use cafe::{CafeBoard, CafeMember};
pub use config::{
    CafeConfig, Config, FeatureConfig, FeaturesConfig, PoolConfig, ProductsConfig,
    RateLimitConfig, RetryConfig,
};
pub use keyword::{KeywordCategory, KeywordVolume};
pub use product::{ProductListing, RankedProduct};
pub use rank::RankCheck;
