// src/pipeline/keywords.rs

//! Keyword volume and category lookups.

use std::sync::Arc;

use crate::batch::{BatchResult, ProgressSink};
use crate::error::Result;
use crate::models::{KeywordCategory, KeywordVolume};
use crate::pipeline::RunContext;
use crate::services::KeywordApi;
use crate::utils::normalize_keywords;

/// Look up monthly search volume for every keyword.
///
/// Keywords are trimmed and deduplicated case-insensitively first, so the
/// result is indexed by the normalized list, not the raw input.
pub async fn run_keyword_volumes<A, I, K, S>(
    api: Arc<A>,
    keywords: I,
    ctx: &RunContext,
    sink: &mut S,
) -> Result<BatchResult<KeywordVolume>>
where
    A: KeywordApi + ?Sized + 'static,
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
    S: ProgressSink<KeywordVolume> + ?Sized,
{
    let keywords = normalize_keywords(keywords);
    log::info!("Fetching search volume for {} keywords", keywords.len());

    let processor = ctx
        .processor("keyword-volume", &ctx.config.features.keyword_volume)?
        .with_labeler(String::clone);
    let policy = ctx.retry_policy();
    let token = ctx.token.clone();

    let handler = move |keyword: String| {
        let api = Arc::clone(&api);
        let policy = policy.clone();
        let token = token.clone();
        async move { policy.run(&token, |_| api.search_volume(&keyword)).await }
    };

    Ok(processor.run(keywords, handler, sink).await)
}

/// Look up the shopping category for every keyword.
pub async fn run_category_lookup<A, I, K, S>(
    api: Arc<A>,
    keywords: I,
    ctx: &RunContext,
    sink: &mut S,
) -> Result<BatchResult<KeywordCategory>>
where
    A: KeywordApi + ?Sized + 'static,
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
    S: ProgressSink<KeywordCategory> + ?Sized,
{
    let keywords = normalize_keywords(keywords);
    log::info!("Fetching categories for {} keywords", keywords.len());

    let processor = ctx
        .processor("category", &ctx.config.features.category)?
        .with_labeler(String::clone);
    let policy = ctx.retry_policy();
    let token = ctx.token.clone();

    let handler = move |keyword: String| {
        let api = Arc::clone(&api);
        let policy = policy.clone();
        let token = token.clone();
        async move { policy.run(&token, |_| api.category(&keyword)).await }
    };

    Ok(processor.run(keywords, handler, sink).await)
}
