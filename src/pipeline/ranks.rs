// src/pipeline/ranks.rs

//! Product rank tracking across keywords.

use std::sync::Arc;

use chrono::Utc;

use crate::batch::{BatchResult, ProgressSink};
use crate::error::{AppError, Result};
use crate::models::RankCheck;
use crate::pipeline::RunContext;
use crate::services::RankApi;
use crate::utils::normalize_keywords;

/// Look up where `product_id` ranks for each keyword.
///
/// A product missing from the searched range is a successful check with
/// `rank: None`, not a failure.
pub async fn run_rank_check<A, I, K, S>(
    api: Arc<A>,
    product_id: &str,
    keywords: I,
    ctx: &RunContext,
    sink: &mut S,
) -> Result<BatchResult<RankCheck>>
where
    A: RankApi + ?Sized + 'static,
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
    S: ProgressSink<RankCheck> + ?Sized,
{
    let product_id = product_id.trim();
    if product_id.is_empty() {
        return Err(AppError::validation("product id must not be empty"));
    }
    let keywords = normalize_keywords(keywords);
    log::info!(
        "Checking rank of product {} for {} keywords",
        product_id,
        keywords.len()
    );

    let processor = ctx
        .processor("rank-check", &ctx.config.features.rank_check)?
        .with_labeler(String::clone);
    let policy = ctx.retry_policy();
    let token = ctx.token.clone();
    let product_id: Arc<str> = Arc::from(product_id);

    let handler = move |keyword: String| {
        let api = Arc::clone(&api);
        let policy = policy.clone();
        let token = token.clone();
        let product_id = Arc::clone(&product_id);
        async move {
            let rank = policy
                .run(&token, |_| api.product_rank(&keyword, &product_id))
                .await?;
            log::debug!("'{}' -> {:?}", keyword, rank);
            Ok::<_, AppError>(RankCheck {
                keyword,
                product_id: product_id.to_string(),
                rank,
                checked_at: Utc::now(),
            })
        }
    };

    Ok(processor.run(keywords, handler, sink).await)
}
