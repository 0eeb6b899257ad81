// src/pipeline/products.rs

//! Product-name collection across keywords.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::batch::{BatchResult, ProgressSink};
use crate::error::{AppError, Result};
use crate::models::{ProductListing, RankedProduct};
use crate::pipeline::RunContext;
use crate::services::ShoppingApi;
use crate::utils::{normalize_keywords, title_key};

/// Per-keyword listings plus the merged product ranking.
#[derive(Debug, Serialize)]
pub struct ProductCollection {
    pub batch: BatchResult<Vec<ProductListing>>,
    pub products: Vec<RankedProduct>,
}

/// Collect up to `products.max_per_keyword` listings per keyword and merge
/// them into one ranking.
///
/// Keywords that fail contribute nothing to the ranking; their failure is
/// still visible in `batch`.
pub async fn run_product_collection<A, I, K, S>(
    api: Arc<A>,
    keywords: I,
    ctx: &RunContext,
    sink: &mut S,
) -> Result<ProductCollection>
where
    A: ShoppingApi + ?Sized + 'static,
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
    S: ProgressSink<Vec<ProductListing>> + ?Sized,
{
    let keywords = normalize_keywords(keywords);
    let max = ctx.config.products.max_per_keyword;
    log::info!(
        "Collecting product names for {} keywords (max {} each)",
        keywords.len(),
        max
    );

    let processor = ctx
        .processor("product-names", &ctx.config.features.product_names)?
        .with_labeler(String::clone);
    let policy = ctx.retry_policy();
    let token = ctx.token.clone();

    let handler = move |keyword: String| {
        let api = Arc::clone(&api);
        let policy = policy.clone();
        let token = token.clone();
        async move {
            let mut listings = policy
                .run(&token, |_| api.product_listings(&keyword, max))
                .await?;
            listings.truncate(max);
            log::debug!("{}: {} listings", keyword, listings.len());
            Ok::<_, AppError>(listings)
        }
    };

    let batch = processor.run(keywords, handler, sink).await;
    let products = merge_products(batch.successes().flat_map(|(_, l)| l.iter().cloned()));
    log::info!(
        "Merged {} unique products from {} keywords",
        products.len(),
        batch.summary.succeeded
    );

    Ok(ProductCollection { batch, products })
}

struct Accumulator {
    first: ProductListing,
    rank_sum: u64,
    occurrences: u64,
    keywords: Vec<String>,
}

/// Merge listings by case-insensitive trimmed title.
///
/// Each product's `avg_rank` is the mean of every rank it was seen at, and
/// products are ordered by it (ties keep first-seen order) before
/// `final_rank` is assigned from 1. Listings with a blank title are dropped.
pub fn merge_products<I>(listings: I) -> Vec<RankedProduct>
where
    I: IntoIterator<Item = ProductListing>,
{
    let mut merged: Vec<Accumulator> = Vec::new();
    let mut by_title: HashMap<String, usize> = HashMap::new();

    for listing in listings {
        let key = title_key(&listing.title);
        if key.is_empty() {
            continue;
        }
        match by_title.get(&key) {
            Some(&slot) => {
                let acc = &mut merged[slot];
                acc.rank_sum += u64::from(listing.rank);
                acc.occurrences += 1;
                if !acc.keywords.contains(&listing.keyword) {
                    acc.keywords.push(listing.keyword);
                }
            }
            None => {
                by_title.insert(key, merged.len());
                merged.push(Accumulator {
                    rank_sum: u64::from(listing.rank),
                    occurrences: 1,
                    keywords: vec![listing.keyword.clone()],
                    first: listing,
                });
            }
        }
    }

    let mut products: Vec<RankedProduct> = merged
        .into_iter()
        .map(|acc| RankedProduct {
            title: acc.first.title.trim().to_string(),
            avg_rank: acc.rank_sum as f64 / acc.occurrences as f64,
            keyword_count: acc.keywords.len(),
            keywords_found_in: acc.keywords,
            final_rank: 0,
            price: acc.first.price,
            mall_name: acc.first.mall_name,
            category: acc.first.category,
            link: acc.first.link,
        })
        .collect();

    products.sort_by(|a, b| a.avg_rank.total_cmp(&b.avg_rank));
    for (i, product) in products.iter_mut().enumerate() {
        product.final_rank = i + 1;
    }
    products
}
