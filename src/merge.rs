//! Fan-in of many subscriptions into one stream.
//!
//! Each member gets a forwarding task that moves its items onto a shared
//! output channel.  Shutdown is a single [`CancellationToken`]: cancelling it
//! makes every forwarder close its member and report the result back.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CloseError;
use crate::fetch::Item;
use crate::subscription::{discard_buffered, Subscription};

/// Merges the updates of several subscriptions.
///
/// No ordering holds between members, and no de-duplication happens across
/// them.  Dropping the aggregator without closing it still shuts every member
/// down, but nobody waits for them.
pub struct Aggregator {
    updates: mpsc::Receiver<Item>,
    quit: CancellationToken,
    reports: mpsc::Receiver<Result<(), CloseError>>,
    members: usize,
    closed: bool,
}

impl Aggregator {
    /// Start forwarding from every member.  Must be called within a tokio
    /// runtime.
    pub fn new(members: Vec<Box<dyn Subscription>>) -> Self {
        let (updates_tx, updates) = mpsc::channel(1);
        let (reports_tx, reports) = mpsc::channel(members.len().max(1));
        let quit = CancellationToken::new();
        let count = members.len();

        for (index, member) in members.into_iter().enumerate() {
            tokio::spawn(forward(
                index,
                member,
                updates_tx.clone(),
                quit.clone(),
                reports_tx.clone(),
            ));
        }

        Self {
            updates,
            quit,
            reports,
            members: count,
            closed: false,
        }
    }

    /// Items from all members, in whatever order they become ready.
    pub fn updates(&mut self) -> &mut mpsc::Receiver<Item> {
        &mut self.updates
    }

    /// Shut down every member and wait until all of them have closed.
    ///
    /// Returns the first member error to arrive.  Later errors are logged and
    /// dropped.
    pub async fn close(&mut self) -> Result<(), CloseError> {
        if self.closed {
            return Err(CloseError::AlreadyClosed);
        }
        self.closed = true;
        self.quit.cancel();

        let mut first: Option<CloseError> = None;
        for _ in 0..self.members {
            match self.reports.recv().await {
                Some(Ok(())) => {}
                Some(Err(e)) if first.is_none() => first = Some(e),
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "dropping additional member close error");
                }
                None => {
                    tracing::warn!("forwarder exited without reporting its close result");
                    break;
                }
            }
        }

        discard_buffered(&mut self.updates);
        tracing::info!(members = self.members, ok = first.is_none(), "aggregator closed");
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.quit.cancel();
    }
}

#[async_trait]
impl Subscription for Aggregator {
    fn updates(&mut self) -> &mut mpsc::Receiver<Item> {
        Aggregator::updates(self)
    }

    async fn close(&mut self) -> Result<(), CloseError> {
        Aggregator::close(self).await
    }
}

/// Move items from one member to the shared output until shutdown, then close
/// the member and report how that went.
async fn forward(
    index: usize,
    mut member: Box<dyn Subscription>,
    out: mpsc::Sender<Item>,
    quit: CancellationToken,
    reports: mpsc::Sender<Result<(), CloseError>>,
) {
    loop {
        let next = tokio::select! {
            _ = quit.cancelled() => break,
            next = member.updates().recv() => next,
        };

        let Some(item) = next else {
            // Member ended on its own; it still has to be closed.
            tracing::debug!(member = index, "member stream ended before shutdown");
            quit.cancelled().await;
            break;
        };

        tokio::select! {
            _ = quit.cancelled() => break,
            sent = out.send(item) => {
                if sent.is_err() {
                    // Merged receiver is gone, so the aggregator was dropped.
                    break;
                }
            }
        }
    }

    let result = member.close().await;
    if let Err(e) = &result {
        tracing::debug!(member = index, error = %e, "member closed with error");
    }
    let _ = reports.send(result).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::anyhow;
    use chrono::Utc;
    use tokio::time::{self, timeout, Instant};

    use crate::fetch::{Batch, FakeFetcher, Fetcher};
    use crate::poll::Source;

    /// A hand-driven member: items are pushed through `feed`, close takes
    /// `delay` and returns `error` (if any).
    struct Manual {
        updates: mpsc::Receiver<Item>,
        delay: Duration,
        error: Option<&'static str>,
        closed: Arc<AtomicBool>,
    }

    impl Manual {
        fn new(delay: Duration, error: Option<&'static str>) -> (Self, mpsc::Sender<Item>, Arc<AtomicBool>) {
            let (feed, updates) = mpsc::channel(64);
            let closed = Arc::new(AtomicBool::new(false));
            let member = Self {
                updates,
                delay,
                error,
                closed: Arc::clone(&closed),
            };
            (member, feed, closed)
        }
    }

    #[async_trait]
    impl Subscription for Manual {
        fn updates(&mut self) -> &mut mpsc::Receiver<Item> {
            &mut self.updates
        }

        async fn close(&mut self) -> Result<(), CloseError> {
            time::sleep(self.delay).await;
            self.closed.store(true, Ordering::SeqCst);
            match self.error {
                Some(msg) => Err(CloseError::Fetch(anyhow!(msg))),
                None => Ok(()),
            }
        }
    }

    /// Yields its items once, then hangs.
    struct Once(std::sync::Mutex<Option<Vec<Item>>>);

    #[async_trait]
    impl Fetcher for Once {
        async fn fetch(&self) -> anyhow::Result<Batch> {
            let items = self.0.lock().unwrap().take();
            match items {
                Some(items) => Ok(Batch::new(items, Utc::now() + chrono::Duration::hours(1))),
                None => std::future::pending().await,
            }
        }
    }

    fn once(items: Vec<Item>) -> Box<dyn Subscription> {
        Box::new(Source::new(Once(std::sync::Mutex::new(Some(items)))))
    }

    async fn recv(agg: &mut Aggregator) -> Item {
        timeout(Duration::from_secs(3600), agg.updates().recv())
            .await
            .expect("timed out waiting for item")
            .expect("merged stream ended early")
    }

    #[tokio::test(start_paused = true)]
    async fn merges_items_from_two_sources() {
        let mut agg = Aggregator::new(vec![
            once(vec![Item::new("A", "CA", "G1")]),
            once(vec![Item::new("B", "CB", "G2")]),
        ]);

        let mut guids = vec![recv(&mut agg).await.guid, recv(&mut agg).await.guid];
        guids.sort();
        assert_eq!(guids, vec!["G1", "G2"]);

        assert!(agg.close().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn same_guid_from_different_members_is_forwarded_twice() {
        let mut agg = Aggregator::new(vec![
            once(vec![Item::new("A", "CA", "dup")]),
            once(vec![Item::new("B", "CB", "dup")]),
        ]);

        let mut titles = vec![recv(&mut agg).await.title, recv(&mut agg).await.title];
        titles.sort();
        assert_eq!(titles, vec!["A", "B"]);
        agg.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn close_surfaces_the_single_member_error() {
        let failing = Source::new(FakeFetcher::failing("errX"));
        let mut agg = Aggregator::new(vec![
            once(vec![Item::new("A", "CA", "G1")]),
            Box::new(failing),
        ]);

        recv(&mut agg).await;
        // Let the failing member complete at least one fetch.
        time::sleep(Duration::from_secs(1)).await;

        let err = agg.close().await.unwrap_err();
        assert!(err.to_string().contains("errX"), "got {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn close_waits_for_slowest_member() {
        let (fast, _fast_feed, fast_closed) = Manual::new(Duration::from_millis(10), None);
        let (slow, _slow_feed, slow_closed) = Manual::new(Duration::from_secs(5), None);
        let mut agg = Aggregator::new(vec![Box::new(fast), Box::new(slow)]);

        let started = Instant::now();
        agg.close().await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(fast_closed.load(Ordering::SeqCst));
        assert!(slow_closed.load(Ordering::SeqCst));
        assert_eq!(agg.updates().recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_one_error_when_several_members_fail() {
        let (a, _fa, _) = Manual::new(Duration::ZERO, Some("a failed"));
        let (b, _fb, _) = Manual::new(Duration::ZERO, Some("b failed"));
        let (c, _fc, _) = Manual::new(Duration::ZERO, None);
        let mut agg = Aggregator::new(vec![Box::new(a), Box::new(b), Box::new(c)]);

        let err = agg.close().await.unwrap_err().to_string();
        assert!(err.contains("a failed") || err.contains("b failed"), "got {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_delivery_does_not_stall_shutdown() {
        let (member, feed, closed) = Manual::new(Duration::ZERO, None);
        for i in 0..10 {
            feed.send(Item::new("t", "c", i.to_string())).await.unwrap();
        }
        let mut agg = Aggregator::new(vec![Box::new(member)]);

        // Nobody reads; the forwarder ends up parked on delivery.
        time::sleep(Duration::from_millis(100)).await;

        agg.close().await.unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(agg.updates().recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn member_that_ends_early_is_still_closed() {
        let (member, feed, closed) = Manual::new(Duration::ZERO, None);
        feed.send(Item::new("only", "c", "g")).await.unwrap();
        drop(feed);
        let mut agg = Aggregator::new(vec![Box::new(member)]);

        assert_eq!(recv(&mut agg).await.title, "only");
        assert!(!closed.load(Ordering::SeqCst));

        agg.close().await.unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_aggregator_closes_cleanly() {
        let mut agg = Aggregator::new(Vec::new());
        assert!(agg.close().await.is_ok());
        assert_eq!(agg.updates().recv().await, None);
    }

    #[tokio::test]
    async fn second_close_is_rejected() {
        let mut agg = Aggregator::new(Vec::new());
        agg.close().await.unwrap();
        assert!(matches!(agg.close().await, Err(CloseError::AlreadyClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn aggregators_nest() {
        let inner = Aggregator::new(vec![once(vec![Item::new("A", "CA", "G1")])]);
        let mut outer = Aggregator::new(vec![
            Box::new(inner),
            once(vec![Item::new("B", "CB", "G2")]),
        ]);

        let mut guids = vec![recv(&mut outer).await.guid, recv(&mut outer).await.guid];
        guids.sort();
        assert_eq!(guids, vec!["G1", "G2"]);
        outer.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_aggregator_closes_members() {
        let (member, _feed, closed) = Manual::new(Duration::ZERO, None);
        let agg = Aggregator::new(vec![Box::new(member)]);

        drop(agg);
        time::sleep(Duration::from_millis(10)).await;
        assert!(closed.load(Ordering::SeqCst));
    }
}
