//! Outcome bookkeeping for a batch run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::time::Instant;

use crate::batch::{ErrorKind, Outcome, ProgressEvent};

/// Final counters for a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Whether a stop was requested during the run.
    pub cancelled: bool,
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
}

impl Summary {
    /// Fraction of items that succeeded, in `[0, 1]`.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.total as f64
    }
}

/// Outcomes in submission order plus summary statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult<R> {
    pub outcomes: Vec<Outcome<R>>,
    pub summary: Summary,
}

impl<R> BatchResult<R> {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Outcome<R>> {
        self.outcomes.get(index)
    }

    /// Successful values with their submission index.
    pub fn successes(&self) -> impl Iterator<Item = (usize, &R)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.value().map(|v| (i, v)))
    }

    /// Failures with their submission index.
    pub fn failures(&self) -> impl Iterator<Item = (usize, ErrorKind, &str)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| match o {
                Outcome::Failure { kind, message } => Some((i, *kind, message.as_str())),
                _ => None,
            })
    }

    /// Indices of items that never started.
    pub fn skipped(&self) -> impl Iterator<Item = usize> + '_ {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_skipped())
            .map(|(i, _)| i)
    }

    /// Consume the result, keeping only successful values in submission order.
    pub fn into_values(self) -> Vec<R> {
        self.outcomes
            .into_iter()
            .filter_map(Outcome::into_value)
            .collect()
    }
}

/// Failure message for an item whose worker died before reporting it.
pub const LOST_ITEM_MESSAGE: &str = "worker exited without reporting";

/// Accumulates outcomes as they arrive in completion order.
#[derive(Debug)]
pub struct ResultAggregator<R> {
    slots: Vec<Option<Outcome<R>>>,
    completed: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl<R> ResultAggregator<R> {
    pub fn new(total: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(total).collect(),
            completed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Store `outcome` at its submission index and return the progress event.
    ///
    /// A second outcome for the same index is ignored; the first one wins.
    pub fn record(
        &mut self,
        index: usize,
        outcome: Outcome<R>,
        label: impl Into<String>,
    ) -> ProgressEvent {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                match &outcome {
                    Outcome::Success { .. } => self.succeeded += 1,
                    Outcome::Failure { .. } => self.failed += 1,
                    Outcome::Skipped => self.skipped += 1,
                }
                *slot = Some(outcome);
                self.completed += 1;
            }
            Some(_) => log::error!("Duplicate outcome for item {index} ignored"),
            None => log::error!("Outcome for unknown item {index} ignored"),
        }

        ProgressEvent {
            completed: self.completed,
            total: self.total(),
            label: label.into(),
        }
    }

    /// Indices that have no outcome yet, in submission order.
    pub fn missing(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.is_none().then_some(index))
            .collect()
    }

    /// The outcome recorded for `index`, if any.
    pub fn outcome(&self, index: usize) -> Option<&Outcome<R>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Close the run. Slots nobody reported on become fatal failures.
    pub fn finish(self, cancelled: bool) -> BatchResult<R> {
        let mut failed = self.failed;
        let outcomes: Vec<Outcome<R>> = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    log::error!("Item {index} finished without an outcome");
                    failed += 1;
                    Outcome::failure(ErrorKind::Fatal, LOST_ITEM_MESSAGE)
                })
            })
            .collect();

        let summary = Summary {
            total: outcomes.len(),
            succeeded: self.succeeded,
            failed,
            skipped: self.skipped,
            duration: self.started.elapsed(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            cancelled,
        };

        BatchResult { outcomes, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_by_index_not_arrival() {
        let mut agg = ResultAggregator::new(3);
        let first = agg.record(2, Outcome::success("c"), "c");
        let second = agg.record(0, Outcome::success("a"), "a");
        let third = agg.record(1, Outcome::failure(ErrorKind::Fatal, "boom"), "b");

        assert_eq!((first.completed, second.completed, third.completed), (1, 2, 3));
        assert!(third.is_final());

        let result = agg.finish(false);
        assert_eq!(result.outcomes[0], Outcome::success("a"));
        assert_eq!(result.outcomes[2], Outcome::success("c"));
        assert!(result.outcomes[1].is_failure());
        assert_eq!(result.summary.succeeded, 2);
        assert_eq!(result.summary.failed, 1);
    }

    #[test]
    fn duplicate_record_is_ignored() {
        let mut agg = ResultAggregator::new(1);
        agg.record(0, Outcome::success(1), "x");
        let event = agg.record(0, Outcome::success(2), "x");
        assert_eq!(event.completed, 1);
        assert_eq!(agg.outcome(0), Some(&Outcome::success(1)));
    }

    #[test]
    fn missing_slots_become_failures() {
        let mut agg = ResultAggregator::<u8>::new(2);
        agg.record(0, Outcome::Skipped, "x");
        let result = agg.finish(true);

        assert_eq!(result.summary.skipped, 1);
        assert_eq!(result.summary.failed, 1);
        assert!(result.summary.cancelled);
        assert!(result.outcomes[1].is_failure());
    }

    #[test]
    fn filling_missing_slots_reaches_final_progress() {
        let mut agg = ResultAggregator::<u8>::new(4);
        agg.record(1, Outcome::success(1), "b");
        agg.record(3, Outcome::success(3), "d");
        assert_eq!(agg.missing(), vec![0, 2]);

        let mut last = None;
        for index in agg.missing() {
            last = Some(agg.record(index, Outcome::failure(ErrorKind::Fatal, LOST_ITEM_MESSAGE), ""));
        }

        assert!(agg.missing().is_empty());
        assert!(last.is_some_and(|event| event.is_final()));
        let result = agg.finish(false);
        assert_eq!(result.summary.failed, 2);
        assert_eq!(result.summary.succeeded, 2);
    }

    #[test]
    fn accessors() {
        let mut agg = ResultAggregator::new(3);
        agg.record(0, Outcome::success(10), "");
        agg.record(1, Outcome::failure(ErrorKind::Transient, "later"), "");
        agg.record(2, Outcome::Skipped, "");
        let result = agg.finish(true);

        assert_eq!(result.successes().collect::<Vec<_>>(), vec![(0, &10)]);
        assert_eq!(
            result.failures().collect::<Vec<_>>(),
            vec![(1, ErrorKind::Transient, "later")]
        );
        assert_eq!(result.skipped().collect::<Vec<_>>(), vec![2]);
        assert_eq!(result.into_values(), vec![10]);
    }

    #[test]
    fn summary_serializes_duration_as_millis() {
        let result = ResultAggregator::<()>::new(0).finish(false);
        let json = serde_json::to_value(&result.summary).unwrap();
        assert!(json.get("duration_ms").is_some());
        assert_eq!(json["total"], 0);
        assert_eq!(result.summary.success_rate(), 1.0);
    }
}
