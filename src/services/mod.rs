//! API collaborators consumed by the pipelines.
//!
//! Request construction, authentication and response parsing live behind
//! these traits. Implementations must be safe to call from several workers
//! at once and should map vendor failures onto [`AppError`](crate::error::AppError) so the batch
//! layer can classify them.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    BidPosition, CafeBoard, CafeMember, Device, KeywordBasics, KeywordCategory, KeywordVolume,
    ProductListing,
};

/// Keyword research endpoints.
#[async_trait]
pub trait KeywordApi: Send + Sync {
    /// Monthly PC and mobile search volume for one keyword.
    async fn search_volume(&self, keyword: &str) -> Result<KeywordVolume>;

    /// Shopping category path for one keyword.
    async fn category(&self, keyword: &str) -> Result<KeywordCategory>;
}

/// Shopping search endpoint.
#[async_trait]
pub trait ShoppingApi: Send + Sync {
    /// Up to `max` listings for `keyword`, ranked from 1.
    async fn product_listings(&self, keyword: &str, max: usize) -> Result<Vec<ProductListing>>;
}

/// Community board endpoint.
#[async_trait]
pub trait CafeApi: Send + Sync {
    /// Authors of the articles on one page of `board`.
    ///
    /// An empty list means the page exists but has no articles.
    async fn fetch_members(&self, board: &CafeBoard, page: u32) -> Result<Vec<CafeMember>>;
}

/// Search-ad keyword tool.
#[async_trait]
pub trait BidApi: Send + Sync {
    /// Search volume and click statistics for one keyword.
    async fn basic_data(&self, keyword: &str) -> Result<KeywordBasics>;

    /// Bid ladder for the first result page on `device`.
    ///
    /// Devices must be requested separately.
    async fn bid_positions(&self, keyword: &str, device: Device) -> Result<Vec<BidPosition>>;
}

/// Shopping search used for rank tracking.
#[async_trait]
pub trait RankApi: Send + Sync {
    /// Position of `product_id` in the results for `keyword`, or `None` if it
    /// is not within the searched range.
    async fn product_rank(&self, keyword: &str, product_id: &str) -> Result<Option<u32>>;
}
