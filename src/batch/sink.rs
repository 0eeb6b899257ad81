//! Progress streaming.
//!
//! Sinks are driven from the single collector loop, so implementations see
//! events strictly one at a time and may hold `&mut` state.

use tokio::sync::mpsc;

use crate::batch::{Outcome, ProgressEvent};

/// Receiver of per-item and aggregate progress.
pub trait ProgressSink<R> {
    /// Called once per item, before the matching [`ProgressSink::on_progress`].
    fn on_item_done(&mut self, _index: usize, _outcome: &Outcome<R>) {}

    fn on_progress(&mut self, _event: &ProgressEvent) {}
}

/// Discards every event.
impl<R> ProgressSink<R> for () {}

/// Forwards events to a pair of closures.
pub struct Callbacks<I, P> {
    on_item: I,
    on_progress: P,
}

impl<I, P> Callbacks<I, P> {
    pub fn new(on_item: I, on_progress: P) -> Self {
        Self {
            on_item,
            on_progress,
        }
    }
}

impl<R, I, P> ProgressSink<R> for Callbacks<I, P>
where
    I: FnMut(usize, &Outcome<R>),
    P: FnMut(&ProgressEvent),
{
    fn on_item_done(&mut self, index: usize, outcome: &Outcome<R>) {
        (self.on_item)(index, outcome)
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        (self.on_progress)(event)
    }
}

/// Event published by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent<R> {
    ItemDone { index: usize, outcome: Outcome<R> },
    Progress(ProgressEvent),
}

/// Publishes events on an unbounded channel for an external subscriber.
///
/// A dropped receiver is not an error; events are simply discarded.
pub struct ChannelSink<R> {
    tx: mpsc::UnboundedSender<BatchEvent<R>>,
}

impl<R> ChannelSink<R> {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BatchEvent<R>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl<R: Clone> ProgressSink<R> for ChannelSink<R> {
    fn on_item_done(&mut self, index: usize, outcome: &Outcome<R>) {
        let _ = self.tx.send(BatchEvent::ItemDone {
            index,
            outcome: outcome.clone(),
        });
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        let _ = self.tx.send(BatchEvent::Progress(event.clone()));
    }
}

/// Writes progress to the `log` facade.
///
/// Failures are logged at `warn`, everything else at `debug`, and a progress
/// line is emitted at `info` every `every` items and on the final item.
pub struct LogSink {
    name: String,
    every: usize,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            every: 10,
        }
    }

    pub fn every(mut self, every: usize) -> Self {
        self.every = every.max(1);
        self
    }
}

impl<R> ProgressSink<R> for LogSink {
    fn on_item_done(&mut self, index: usize, outcome: &Outcome<R>) {
        match outcome {
            Outcome::Success { .. } => log::debug!("[{}] item {} done", self.name, index),
            Outcome::Failure { kind, message } => {
                log::warn!("[{}] item {} failed ({}): {}", self.name, index, kind, message)
            }
            Outcome::Skipped => log::debug!("[{}] item {} skipped", self.name, index),
        }
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        if event.completed % self.every == 0 || event.is_final() {
            log::info!(
                "[{}] {}/{} ({:.0}%) {}",
                self.name,
                event.completed,
                event.total,
                event.percent(),
                event.label
            );
        }
    }
}
