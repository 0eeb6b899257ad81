// src/pipeline/cafe.rs

//! Page-by-page member extraction from a cafe board.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::batch::{BatchResult, ProgressSink};
use crate::error::Result;
use crate::models::{CafeBoard, CafeMember};
use crate::pipeline::RunContext;
use crate::services::CafeApi;

/// Members per page plus the merged member list.
#[derive(Debug, Serialize)]
pub struct CafeCrawl {
    pub batch: BatchResult<Vec<CafeMember>>,
    pub members: Vec<CafeMember>,
}

/// Crawl `pages` of `board`, one work item per page.
///
/// Each page fetch is retried with the configured policy and gives up as soon
/// as a stop is requested. Use `ctx.config.cafe.pages()` for the configured
/// range.
pub async fn run_cafe_crawl<A, P, S>(
    api: Arc<A>,
    board: CafeBoard,
    pages: P,
    ctx: &RunContext,
    sink: &mut S,
) -> Result<CafeCrawl>
where
    A: CafeApi + ?Sized + 'static,
    P: IntoIterator<Item = u32>,
    S: ProgressSink<Vec<CafeMember>> + ?Sized,
{
    let pages: Vec<u32> = pages.into_iter().collect();
    log::info!(
        "Crawling {} pages of board '{}' in cafe {}",
        pages.len(),
        board.name,
        board.cafe_id
    );

    let processor = ctx
        .processor("cafe-pages", &ctx.config.features.cafe_pages)?
        .with_labeler(|page: &u32| format!("page {page}"));
    let policy = ctx.retry_policy();
    let token = ctx.token.clone();
    let board = Arc::new(board);

    let handler = move |page: u32| {
        let api = Arc::clone(&api);
        let board = Arc::clone(&board);
        let policy = policy.clone();
        let token = token.clone();
        async move { policy.run(&token, |_| api.fetch_members(&board, page)).await }
    };

    let batch = processor.run(pages, handler, sink).await;
    let members = merge_members(batch.successes().map(|(_, page)| page.as_slice()));
    log::info!(
        "Extracted {} unique members from {} pages",
        members.len(),
        batch.summary.succeeded
    );

    Ok(CafeCrawl { batch, members })
}

/// Merge per-page member lists by user id.
///
/// Article counts are summed and the first nickname seen is kept; members
/// stay in first-seen order.
pub fn merge_members<'a, I>(pages: I) -> Vec<CafeMember>
where
    I: IntoIterator<Item = &'a [CafeMember]>,
{
    let mut merged: Vec<CafeMember> = Vec::new();
    let mut by_id: HashMap<&'a str, usize> = HashMap::new();

    for member in pages.into_iter().flatten() {
        match by_id.get(member.user_id.as_str()) {
            Some(&slot) => merged[slot].article_count += member.article_count,
            None => {
                by_id.insert(&member.user_id, merged.len());
                merged.push(member.clone());
            }
        }
    }
    merged
}
