//! Fixed-size worker pool over a shared FIFO queue.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::batch::{
    BatchResult, CancellationToken, Classify, ErrorKind, LOST_ITEM_MESSAGE, Outcome, ProgressSink,
    ResultAggregator, Throttle, WorkItem,
};
use crate::error::{AppError, Result};

type Labeler<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Runs a handler over a list of items with bounded concurrency.
///
/// ```no_run
/// # use orchestrator::batch::{BatchProcessor, CancellationToken};
/// # use orchestrator::error::AppError;
/// # async fn demo() -> orchestrator::error::Result<()> {
/// let token = CancellationToken::new();
/// let result = BatchProcessor::new(3)?
///     .with_token(token.clone())
///     .run(
///         vec!["a".to_string(), "bb".to_string()],
///         |s: String| async move { Ok::<_, AppError>(s.len()) },
///         &mut (),
///     )
///     .await;
/// assert_eq!(result.summary.succeeded, 2);
/// # Ok(())
/// # }
/// ```
pub struct BatchProcessor<T> {
    max_workers: usize,
    limiter: Option<Arc<dyn Throttle>>,
    token: CancellationToken,
    label: String,
    labeler: Option<Labeler<T>>,
}

impl<T> BatchProcessor<T>
where
    T: Send + 'static,
{
    /// Create a processor with `max_workers` concurrent workers.
    pub fn new(max_workers: usize) -> Result<Self> {
        if max_workers == 0 {
            return Err(AppError::config("max_workers must be at least 1"));
        }
        Ok(Self {
            max_workers,
            limiter: None,
            token: CancellationToken::new(),
            label: "batch".to_string(),
            labeler: None,
        })
    }

    /// Gate every handler invocation behind `limiter`.
    pub fn with_limiter(mut self, limiter: Arc<dyn Throttle>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Name used in logs and as the default progress label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Derive the progress label from each item.
    pub fn with_labeler<L>(mut self, labeler: L) -> Self
    where
        L: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.labeler = Some(Arc::new(labeler));
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Process every item and return outcomes in submission order.
    ///
    /// Returns once every item has an outcome and every worker has been
    /// joined. Item failures and handler panics are recorded, never raised.
    pub async fn run<R, E, F, Fut, S>(&self, items: Vec<T>, handler: F, sink: &mut S) -> BatchResult<R>
    where
        R: Send + 'static,
        E: Classify + Display + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        S: ProgressSink<R> + ?Sized,
    {
        let total = items.len();
        let mut aggregator = ResultAggregator::new(total);
        if total == 0 {
            return aggregator.finish(self.token.is_stop_requested());
        }

        let labels: Vec<String> = match &self.labeler {
            Some(labeler) => items.iter().map(|item| labeler(item)).collect(),
            None => vec![self.label.clone(); total],
        };

        let queue: VecDeque<WorkItem<T>> = items
            .into_iter()
            .enumerate()
            .map(|(index, value)| WorkItem { index, value })
            .collect();
        let queue = Arc::new(Mutex::new(queue));
        let handler = Arc::new(handler);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let workers = self.max_workers.min(total);
        log::info!(
            "[{}] Starting batch: {} items, {} workers",
            self.label,
            total,
            workers
        );

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            pool.spawn(worker(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&handler),
                self.limiter.clone(),
                self.token.clone(),
                tx.clone(),
            ));
        }
        drop(tx);

        // Single collector: the aggregator and the sink are only touched here.
        while let Some((index, outcome)) = rx.recv().await {
            let label = labels.get(index).map(String::as_str).unwrap_or_default();
            let event = aggregator.record(index, outcome, label);
            if let Some(outcome) = aggregator.outcome(index) {
                sink.on_item_done(index, outcome);
            }
            sink.on_progress(&event);
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                log::error!("[{}] Worker terminated abnormally: {}", self.label, e);
            }
        }

        // Items a dead worker held or never dequeued still get an outcome and an event.
        let lost = aggregator.missing();
        if !lost.is_empty() {
            log::error!(
                "[{}] {} items lost with their workers, marking them failed",
                self.label,
                lost.len()
            );
        }
        for index in lost {
            let label = labels.get(index).map(String::as_str).unwrap_or_default();
            let outcome = Outcome::failure(ErrorKind::Fatal, LOST_ITEM_MESSAGE);
            let event = aggregator.record(index, outcome, label);
            if let Some(outcome) = aggregator.outcome(index) {
                sink.on_item_done(index, outcome);
            }
            sink.on_progress(&event);
        }

        let result = aggregator.finish(self.token.is_stop_requested());
        let s = &result.summary;
        log::info!(
            "[{}] Batch finished in {:?}: {} succeeded, {} failed, {} skipped (of {})",
            self.label,
            s.duration,
            s.succeeded,
            s.failed,
            s.skipped,
            s.total
        );
        result
    }
}

async fn worker<T, R, E, F, Fut>(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<WorkItem<T>>>>,
    handler: Arc<F>,
    limiter: Option<Arc<dyn Throttle>>,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<(usize, Outcome<R>)>,
) where
    E: Classify + Display,
    F: Fn(T) -> Fut,
    Fut: Future<Output = std::result::Result<R, E>>,
{
    loop {
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(WorkItem { index, value }) = next else {
            break;
        };

        let outcome = if token.is_stop_requested() {
            Outcome::Skipped
        } else {
            dispatch(index, value, &*handler, limiter.as_deref(), &token).await
        };

        if tx.send((index, outcome)).is_err() {
            // Collector is gone; nobody is listening any more.
            break;
        }
    }
    log::debug!("Worker {worker_id} exiting");
}

async fn dispatch<T, R, E, F, Fut>(
    index: usize,
    value: T,
    handler: &F,
    limiter: Option<&dyn Throttle>,
    token: &CancellationToken,
) -> Outcome<R>
where
    E: Classify + Display,
    F: Fn(T) -> Fut,
    Fut: Future<Output = std::result::Result<R, E>>,
{
    if let Some(limiter) = limiter {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Outcome::Skipped,
            _ = limiter.wait() => {}
        }
        if token.is_stop_requested() {
            return Outcome::Skipped;
        }
    }

    let call = AssertUnwindSafe(async { handler(value).await }).catch_unwind();
    match call.await {
        Ok(Ok(value)) => {
            if let Some(limiter) = limiter {
                limiter.on_success();
            }
            Outcome::success(value)
        }
        Ok(Err(error)) => {
            let kind = error.kind();
            if let Some(limiter) = limiter {
                match kind {
                    ErrorKind::RateLimited => limiter.on_rate_limited(error.retry_after()),
                    ErrorKind::Transient | ErrorKind::Fatal => limiter.on_error(),
                    ErrorKind::Cancelled => {}
                }
            }
            match kind {
                ErrorKind::Cancelled => Outcome::Skipped,
                kind => Outcome::failure(kind, error.to_string()),
            }
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            log::error!("Item {index} handler panicked: {message}");
            Outcome::failure(ErrorKind::Fatal, format!("handler panicked: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchEvent, Callbacks, ChannelSink, ProgressEvent, RateLimiter};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn zero_workers_is_rejected() {
        assert!(BatchProcessor::<u32>::new(0).is_err());
    }

    #[tokio::test]
    async fn empty_input_returns_immediately() {
        let result = BatchProcessor::<u32>::new(4)
            .unwrap()
            .run(
                Vec::new(),
                |x: u32| async move { Ok::<_, AppError>(x) },
                &mut (),
            )
            .await;
        assert!(result.is_empty());
        assert_eq!(result.summary.total, 0);
        assert_eq!(result.summary.failed, 0);
    }

    #[tokio::test]
    async fn every_index_gets_exactly_one_outcome() {
        let n = 57;
        let mut seen = Vec::new();
        let mut sink = Callbacks::new(|i: usize, _: &Outcome<usize>| seen.push(i), |_: &ProgressEvent| {});

        let result = BatchProcessor::new(8)
            .unwrap()
            .run(
                (0..n).collect(),
                |x: usize| async move {
                    tokio::time::sleep(Duration::from_micros((x % 7) as u64 * 50)).await;
                    Ok::<_, AppError>(x * 10)
                },
                &mut sink,
            )
            .await;

        assert_eq!(result.len(), n);
        for (i, outcome) in result.outcomes.iter().enumerate() {
            assert_eq!(outcome.value(), Some(&(i * 10)));
        }
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(seen.len(), n);
        assert_eq!(unique.len(), n);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let result = BatchProcessor::new(3)
            .unwrap()
            .run(
                (0..8).collect(),
                |x: usize| async move {
                    if x == 2 || x == 5 {
                        Err(AppError::api(500, format!("item {x} exploded")))
                    } else {
                        Ok(x)
                    }
                },
                &mut (),
            )
            .await;

        assert_eq!(result.summary.failed, 2);
        assert_eq!(result.summary.succeeded, 6);
        for (i, outcome) in result.outcomes.iter().enumerate() {
            if i == 2 || i == 5 {
                assert!(matches!(
                    outcome,
                    Outcome::Failure { kind: ErrorKind::Transient, .. }
                ));
            } else {
                assert!(outcome.is_success());
            }
        }
    }

    #[tokio::test]
    async fn letters_scenario() {
        let items: Vec<String> = ["A", "B", "C", "D", "E"].iter().map(|s| s.to_string()).collect();
        let result = BatchProcessor::new(2)
            .unwrap()
            .run(
                items,
                |item: String| async move {
                    if item == "C" {
                        Err(AppError::validation("boom"))
                    } else {
                        Ok(item.len())
                    }
                },
                &mut (),
            )
            .await;

        let s = &result.summary;
        assert_eq!((s.total, s.succeeded, s.failed, s.skipped), (5, 4, 1, 0));
        let failures: Vec<_> = result.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 2);
        assert!(failures[0].2.contains("boom"));
    }

    #[tokio::test]
    async fn serial_doubling_keeps_index_order() {
        let items: Vec<i64> = (1..=10).collect();
        let result = BatchProcessor::new(1)
            .unwrap()
            .run(
                items.clone(),
                |x: i64| async move { Ok::<_, AppError>(2 * x) },
                &mut (),
            )
            .await;

        let expected: Vec<Outcome<i64>> = items.iter().map(|x| Outcome::success(2 * x)).collect();
        assert_eq!(result.outcomes, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_spaces_handler_starts() {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let limiter: Arc<dyn Throttle> = Arc::new(RateLimiter::new(2.0).unwrap());
        let start = Instant::now();

        let recorded = Arc::clone(&stamps);
        let result = BatchProcessor::new(3)
            .unwrap()
            .with_limiter(limiter)
            .run(
                (0..6).collect(),
                move |x: u32| {
                    let recorded = Arc::clone(&recorded);
                    async move {
                        recorded.lock().unwrap().push(Instant::now());
                        Ok::<_, AppError>(x)
                    }
                },
                &mut (),
            )
            .await;

        assert_eq!(result.summary.succeeded, 6);
        assert!(start.elapsed() >= Duration::from_millis(5 * 500));

        let mut stamps = stamps.lock().unwrap().clone();
        stamps.sort();
        assert_eq!(stamps.len(), 6);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn stop_skips_undispatched_items() {
        let token = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));

        let handler_token = token.clone();
        let handler_started = Arc::clone(&started);
        let result = BatchProcessor::new(1)
            .unwrap()
            .with_token(token.clone())
            .run(
                (0..10).collect(),
                move |x: u32| {
                    let token = handler_token.clone();
                    let started = Arc::clone(&handler_started);
                    async move {
                        if started.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                            token.request_stop();
                            // Repeated requests behave like one.
                            token.request_stop();
                        }
                        Ok::<_, AppError>(x)
                    }
                },
                &mut (),
            )
            .await;

        let s = &result.summary;
        assert_eq!(started.load(Ordering::SeqCst), 3);
        assert_eq!(s.succeeded, 3);
        assert_eq!(s.skipped, 7);
        assert!(s.cancelled);
        assert_eq!(result.skipped().collect::<Vec<_>>(), (3..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn stop_before_run_skips_everything() {
        let token = CancellationToken::new();
        token.request_stop();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);

        let result = BatchProcessor::new(4)
            .unwrap()
            .with_token(token)
            .run(
                (0..5).collect(),
                move |x: u32| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, AppError>(x) }
                },
                &mut (),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.summary.skipped, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_limiter_wait_skips_promptly() {
        let token = CancellationToken::new();
        let limiter: Arc<dyn Throttle> = Arc::new(RateLimiter::new(0.1).unwrap());

        let stopper = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.request_stop();
        });

        let start = Instant::now();
        let result = BatchProcessor::new(2)
            .unwrap()
            .with_limiter(limiter)
            .with_token(token)
            .run(
                (0..4).collect(),
                |x: u32| async move { Ok::<_, AppError>(x) },
                &mut (),
            )
            .await;

        assert_eq!(result.summary.succeeded, 1);
        assert_eq!(result.summary.skipped, 3);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn cancelled_handler_error_counts_as_skip() {
        let result = BatchProcessor::new(2)
            .unwrap()
            .run(
                vec![1u8, 2],
                |x: u8| async move {
                    if x == 2 {
                        Err(AppError::Cancelled)
                    } else {
                        Ok(x)
                    }
                },
                &mut (),
            )
            .await;

        assert_eq!(result.summary.succeeded, 1);
        assert_eq!(result.summary.skipped, 1);
        assert_eq!(result.summary.failed, 0);
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        let result = BatchProcessor::new(2)
            .unwrap()
            .run(
                (0..4).collect(),
                |x: u32| async move {
                    if x == 1 {
                        panic!("bad item");
                    }
                    Ok::<_, AppError>(x)
                },
                &mut (),
            )
            .await;

        assert_eq!(result.summary.succeeded, 3);
        match &result.outcomes[1] {
            Outcome::Failure { kind, message } => {
                assert_eq!(*kind, ErrorKind::Fatal);
                assert!(message.contains("bad item"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_final_once() {
        let (mut sink, mut rx) = ChannelSink::new();
        let result = BatchProcessor::new(4)
            .unwrap()
            .with_labeler(|k: &String| k.to_uppercase())
            .run(
                (0..20).map(|i| format!("kw{i}")).collect(),
                |k: String| async move {
                    tokio::task::yield_now().await;
                    Ok::<_, AppError>(k.len())
                },
                &mut sink,
            )
            .await;
        drop(sink);

        let mut last = 0;
        let mut finals = 0;
        let mut item_events = 0;
        let mut pending_item = false;
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::ItemDone { .. } => {
                    assert!(!pending_item, "item event without progress");
                    pending_item = true;
                    item_events += 1;
                }
                BatchEvent::Progress(p) => {
                    assert!(pending_item, "progress before item event");
                    pending_item = false;
                    assert!(p.completed >= last);
                    assert!(p.label.starts_with("KW"));
                    last = p.completed;
                    if p.is_final() {
                        finals += 1;
                    }
                }
            }
        }

        assert_eq!(item_events, 20);
        assert_eq!(finals, 1);
        assert_eq!(last, result.summary.total);
    }

    #[tokio::test]
    async fn adaptive_limiter_receives_feedback() {
        use crate::batch::AdaptiveRateLimiter;

        let limiter = Arc::new(
            AdaptiveRateLimiter::new(
                Duration::from_millis(1),
                Duration::from_millis(1),
                Duration::from_millis(50),
            )
            .unwrap(),
        );

        BatchProcessor::new(1)
            .unwrap()
            .with_limiter(limiter.clone())
            .run(
                vec![0u8],
                |_| async { Err::<u8, _>(AppError::api(429, "slow down")) },
                &mut (),
            )
            .await;

        assert_eq!(limiter.interval(), Duration::from_millis(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_max_workers() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handler = {
            let live = Arc::clone(&live);
            let peak = Arc::clone(&peak);
            move |x: usize| {
                let live = Arc::clone(&live);
                let peak = Arc::clone(&peak);
                async move {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, AppError>(x)
                }
            }
        };

        let result = BatchProcessor::new(3)
            .unwrap()
            .run((0..30).collect(), handler, &mut ())
            .await;

        assert_eq!(result.summary.succeeded, 30);
        assert_eq!(live.load(Ordering::SeqCst), 0);
        // Thirty items on three workers keep every worker busy at some point.
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    struct BrokenGate;

    #[async_trait::async_trait]
    impl Throttle for BrokenGate {
        async fn wait(&self) {
            panic!("gate jammed");
        }

        fn interval(&self) -> Duration {
            Duration::ZERO
        }
    }

    #[tokio::test]
    async fn items_lost_with_a_dead_worker_still_complete_progress() {
        let mut events = Vec::new();
        let mut done = Vec::new();
        let mut sink = Callbacks::new(
            |i: usize, o: &Outcome<u8>| done.push((i, o.is_failure())),
            |e: &ProgressEvent| events.push(e.clone()),
        );

        let result = BatchProcessor::new(1)
            .unwrap()
            .with_limiter(Arc::new(BrokenGate))
            .run(vec![1u8, 2, 3], |x| async move { Ok::<_, AppError>(x) }, &mut sink)
            .await;
        drop(sink);

        assert_eq!(result.summary.failed, 3);
        assert!(result.failures().all(|(_, kind, message)| {
            kind == ErrorKind::Fatal && message == LOST_ITEM_MESSAGE
        }));
        assert_eq!(done, vec![(0, true), (1, true), (2, true)]);
        assert_eq!(events.len(), 3);
        assert!(events.last().is_some_and(ProgressEvent::is_final));
    }
}
