//! Single-feed polling engine.
//!
//! A [`Source`] owns one [`Fetcher`] and a dedicated scheduler task.  The
//! task fetches on the schedule the feed asks for, drops items it has already
//! delivered, buffers the rest, and hands them out one at a time on the
//! [`Source::updates`] channel.
//!
//! ## Scheduler loop
//!
//! Each iteration races every event that is currently allowed:
//!
//! * **close requested** — always enabled; reply with the terminal error,
//!   abort any fetch still running, and stop.
//! * **poll timer** — only while no fetch is in flight and the backlog
//!   (counting the item parked in the output channel) has room.  Starts the
//!   fetch on its own task.
//! * **fetch completed** — only while a fetch is in flight.
//! * **send head** — only while the backlog is non-empty.
//!
//! [`tokio::select!`] picks among the ready ones at random.  The backlog, the
//! seen set, and the next poll time are owned by the loop alone, so nothing
//! here needs a lock.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::CloseError;
use crate::fetch::{Batch, Fetcher, Item};
use crate::subscription::{discard_buffered, Subscription};

/// Backlog capacity used by [`SourceConfig::default`].
pub const MAX_PENDING: usize = 10;

/// Delay after a failed fetch used by [`SourceConfig::default`].
pub const ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// Tuning knobs for a [`Source`].
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Name attached to log events from this source.
    pub label: String,
    /// Upper bound on fetched-but-undelivered items.
    pub max_pending: usize,
    /// How long to wait before polling again after a failed fetch.
    pub error_backoff: Duration,
}

impl SourceConfig {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            label: "source".into(),
            max_pending: MAX_PENDING,
            error_backoff: ERROR_BACKOFF,
        }
    }
}

type CloseReply = oneshot::Sender<Result<(), CloseError>>;

/// A polled feed exposed as a stream of unique items.
///
/// The scheduler task starts as soon as the source is constructed, so this
/// must be called from within a tokio runtime.  Dropping a source without
/// calling [`close`](Source::close) also stops the task.
pub struct Source {
    label: String,
    updates: mpsc::Receiver<Item>,
    closing: Option<oneshot::Sender<CloseReply>>,
}

impl Source {
    /// Start polling `fetcher` with the default configuration.
    pub fn new(fetcher: impl Fetcher + 'static) -> Self {
        Self::with_config(fetcher, SourceConfig::default())
    }

    pub fn with_config(fetcher: impl Fetcher + 'static, config: SourceConfig) -> Self {
        let (updates_tx, updates) = mpsc::channel(1);
        let (closing, closing_rx) = oneshot::channel();
        let label = config.label.clone();

        let scheduler = Scheduler {
            fetcher: Arc::new(fetcher),
            backlog: Backlog::new(config.max_pending),
            next_poll: Instant::now(),
            last_error: None,
            config,
        };
        tokio::spawn(scheduler.run(updates_tx, closing_rx));

        Self {
            label,
            updates,
            closing: Some(closing),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Items in fetch order, each GUID at most once.  Ends after `close()`.
    pub fn updates(&mut self) -> &mut mpsc::Receiver<Item> {
        &mut self.updates
    }

    /// Stop the scheduler and wait for it to acknowledge.
    ///
    /// Returns the error of the most recently completed fetch, or `Ok` if that
    /// fetch succeeded (or none ever completed).  A fetch still in flight is
    /// aborted and its result discarded.
    pub async fn close(&mut self) -> Result<(), CloseError> {
        let closing = self.closing.take().ok_or(CloseError::AlreadyClosed)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let result = match closing.send(reply_tx) {
            Ok(()) => reply_rx.await.unwrap_or(Err(CloseError::Gone)),
            Err(_) => Err(CloseError::Gone),
        };

        let dropped = discard_buffered(&mut self.updates);
        if dropped > 0 {
            tracing::trace!(source = %self.label, dropped, "discarded undelivered item on close");
        }
        tracing::info!(source = %self.label, ok = result.is_ok(), "source closed");
        result
    }
}

#[async_trait]
impl Subscription for Source {
    fn updates(&mut self) -> &mut mpsc::Receiver<Item> {
        Source::updates(self)
    }

    async fn close(&mut self) -> Result<(), CloseError> {
        Source::close(self).await
    }
}

// ---------------------------------------------------------------------------
// Backlog — pending queue + seen set
// ---------------------------------------------------------------------------

/// Counts from admitting one batch into a [`Backlog`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Admitted {
    fresh: usize,
    duplicate: usize,
    overflow: usize,
}

/// FIFO of undelivered items plus every GUID ever admitted.
///
/// The seen set only grows.  Items that do not fit are left out of it so a
/// later poll can admit them once there is room.
///
/// `held` is the number of items already handed to the output channel but
/// not yet taken by the consumer; they still count against the capacity.
#[derive(Debug)]
struct Backlog {
    pending: VecDeque<Item>,
    seen: HashSet<String>,
    capacity: usize,
}

impl Backlog {
    fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            seen: HashSet::new(),
            capacity,
        }
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn has_room(&self, held: usize) -> bool {
        self.pending.len() + held < self.capacity
    }

    fn pop_front(&mut self) -> Option<Item> {
        self.pending.pop_front()
    }

    fn admit(&mut self, items: Vec<Item>, held: usize) -> Admitted {
        let mut counts = Admitted::default();
        for item in items {
            if self.seen.contains(&item.guid) {
                counts.duplicate += 1;
            } else if !self.has_room(held) {
                counts.overflow += 1;
            } else {
                self.seen.insert(item.guid.clone());
                self.pending.push_back(item);
                counts.fresh += 1;
            }
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Scheduler task
// ---------------------------------------------------------------------------

/// A fetch running on its own task.  Dropping it aborts the task, so an
/// abandoned fetch does not outlive its source.
struct InFlight {
    done: oneshot::Receiver<Result<Batch>>,
    task: JoinHandle<()>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Scheduler<F> {
    fetcher: Arc<F>,
    config: SourceConfig,
    backlog: Backlog,
    next_poll: Instant,
    last_error: Option<anyhow::Error>,
}

impl<F: Fetcher + 'static> Scheduler<F> {
    async fn run(
        mut self,
        updates: mpsc::Sender<Item>,
        mut closing: oneshot::Receiver<CloseReply>,
    ) {
        let mut in_flight: Option<InFlight> = None;

        loop {
            let held = updates.max_capacity() - updates.capacity();
            let can_fetch = in_flight.is_none() && self.backlog.has_room(held);
            // Also wait on the hand-off slot while it is occupied, so a read
            // by the consumer wakes the loop even with nothing left to send.
            let watch_send = !self.backlog.is_empty() || held > 0;

            tokio::select! {
                request = &mut closing => {
                    match request {
                        Ok(reply) => {
                            let result = match self.last_error.take() {
                                Some(e) => Err(CloseError::Fetch(e)),
                                None => Ok(()),
                            };
                            let _ = reply.send(result);
                        }
                        Err(_) => {
                            tracing::debug!(source = %self.config.label, "source dropped without close");
                        }
                    }
                    if in_flight.is_some() {
                        tracing::debug!(source = %self.config.label, "aborting in-flight fetch");
                    }
                    return;
                }
                _ = time::sleep_until(self.next_poll), if can_fetch => {
                    in_flight = Some(self.start_fetch());
                }
                result = fetch_completion(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.finish_fetch(result, held);
                }
                permit = updates.reserve(), if watch_send => {
                    match permit {
                        Ok(permit) => {
                            // With an empty backlog the permit is just dropped;
                            // the slot is free again and the loop re-evaluates.
                            if let Some(item) = self.backlog.pop_front() {
                                permit.send(item);
                            }
                        }
                        Err(_) => {
                            tracing::debug!(source = %self.config.label, "update receiver gone");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn start_fetch(&self) -> InFlight {
        tracing::debug!(source = %self.config.label, pending = self.backlog.len(), "fetch started");
        let (done_tx, done) = oneshot::channel();
        let fetcher = Arc::clone(&self.fetcher);
        let task = tokio::spawn(async move {
            let _ = done_tx.send(fetcher.fetch().await);
        });
        InFlight { done, task }
    }

    fn finish_fetch(&mut self, result: Result<Batch>, held: usize) {
        match result {
            Ok(batch) => {
                self.next_poll = instant_at(batch.next_poll);
                self.last_error = None;
                let counts = self.backlog.admit(batch.items, held);
                tracing::debug!(
                    source = %self.config.label,
                    fresh = counts.fresh,
                    duplicate = counts.duplicate,
                    overflow = counts.overflow,
                    "fetch finished"
                );
            }
            Err(e) => {
                tracing::warn!(
                    source = %self.config.label,
                    error = %format!("{e:#}"),
                    backoff_secs = self.config.error_backoff.as_secs_f64(),
                    "fetch failed"
                );
                self.next_poll = Instant::now() + self.config.error_backoff;
                self.last_error = Some(e);
            }
        }
    }
}

/// Resolves with the in-flight fetch's result; never resolves when idle.
async fn fetch_completion(in_flight: &mut Option<InFlight>) -> Result<Batch> {
    match in_flight {
        Some(fetch) => (&mut fetch.done)
            .await
            .unwrap_or_else(|_| Err(anyhow!("fetch task ended without a result"))),
        None => std::future::pending().await,
    }
}

/// Map a wall-clock poll time onto the runtime clock.  Past times mean "now".
fn instant_at(when: DateTime<Utc>) -> Instant {
    let delay = (when - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Instant::now() + delay
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
