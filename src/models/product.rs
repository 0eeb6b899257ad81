//! Shopping listings and merged product titles.

use serde::{Deserialize, Serialize};

/// One search result for a keyword.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductListing {
    /// Keyword the listing was found under
    pub keyword: String,

    pub title: String,

    /// 1-based position in the keyword's result list
    pub rank: u32,

    #[serde(default)]
    pub price: Option<u64>,

    #[serde(default)]
    pub mall_name: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub link: String,
}

/// A product title merged across every keyword it appeared under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedProduct {
    /// Title as first seen
    pub title: String,

    /// Mean of the per-keyword ranks
    pub avg_rank: f64,

    /// Keywords in first-seen order
    pub keywords_found_in: Vec<String>,

    pub keyword_count: usize,

    /// 1-based position after sorting by `avg_rank`
    pub final_rank: usize,

    /// Remaining fields from the first listing seen
    pub price: Option<u64>,
    pub mall_name: String,
    pub category: String,
    pub link: String,
}
