// src/pipeline/bids.rs

//! Search-ad bid analysis per keyword.

use std::sync::Arc;

use crate::batch::{BatchResult, ProgressSink};
use crate::error::{AppError, Result};
use crate::models::{BidAnalysis, Device};
use crate::pipeline::RunContext;
use crate::services::BidApi;
use crate::utils::normalize_keywords;

/// Fetch basic statistics and both bid ladders for every keyword.
///
/// The three calls for one keyword happen inside a single work item, so the
/// resource limiter (adaptive by default) spaces keywords rather than calls.
/// Each call is retried on its own.
pub async fn run_bid_analysis<A, I, K, S>(
    api: Arc<A>,
    keywords: I,
    ctx: &RunContext,
    sink: &mut S,
) -> Result<BatchResult<BidAnalysis>>
where
    A: BidApi + ?Sized + 'static,
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
    S: ProgressSink<BidAnalysis> + ?Sized,
{
    let keywords = normalize_keywords(keywords);
    log::info!("Analyzing ad bids for {} keywords", keywords.len());

    let processor = ctx
        .processor("ad-bids", &ctx.config.features.ad_bids)?
        .with_labeler(String::clone);
    let policy = ctx.retry_policy();
    let token = ctx.token.clone();

    let handler = move |keyword: String| {
        let api = Arc::clone(&api);
        let policy = policy.clone();
        let token = token.clone();
        async move {
            let basics = policy.run(&token, |_| api.basic_data(&keyword)).await?;
            let pc_bids = policy
                .run(&token, |_| api.bid_positions(&keyword, Device::Pc))
                .await?;
            let mobile_bids = policy
                .run(&token, |_| api.bid_positions(&keyword, Device::Mobile))
                .await?;
            Ok::<_, AppError>(BidAnalysis {
                basics,
                pc_bids,
                mobile_bids,
            })
        }
    };

    Ok(processor.run(keywords, handler, sink).await)
}
