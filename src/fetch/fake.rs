//! Canned fetcher for demos and tests.
//!
//! Serves a fixed response for a handful of well-known paths so the whole
//! pipeline can run without the network.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{Batch, Fetcher, Item};

/// Replays the same response on every call.
#[derive(Debug, Clone)]
pub struct FakeFetcher {
    items: Vec<Item>,
    error: Option<String>,
    interval: Duration,
}

impl FakeFetcher {
    /// A fetcher that always succeeds with `items`, asking to be polled again
    /// one second later.
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            items,
            error: None,
            interval: Duration::seconds(1),
        }
    }

    /// A fetcher that always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            error: Some(message.into()),
            interval: Duration::seconds(1),
        }
    }

    /// Override the suggested delay between polls.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The canned fetcher registered for `path`, if any.
    pub fn for_path(path: &str) -> Option<Self> {
        let fetcher = match path {
            "/book/feed1/success" => Self::with_items(vec![Item::new(
                "Three Jobless Freaks",
                "Flipkart",
                "Test GUID1",
            )]),
            "/book/feed2/success" => Self::with_items(vec![Item::new(
                "Five Point Someone",
                "Amazon",
                "Test GUID2",
            )]),
            "/book/feed3/success" => Self::with_items(vec![Item::new(
                "The Golden Leaf",
                "Amazon",
                "Test GUID3",
            )]),
            "/book/feed/error" => Self::failing("mock error"),
            _ => return None,
        };
        Some(fetcher)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self) -> Result<Batch> {
        if let Some(message) = &self.error {
            return Err(anyhow!("{message}"));
        }
        Ok(Batch::new(self.items.clone(), Utc::now() + self.interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_paths_replay_their_item() {
        let fetcher = FakeFetcher::for_path("/book/feed1/success").unwrap();

        let first = fetcher.fetch().await.unwrap();
        let second = fetcher.fetch().await.unwrap();

        assert_eq!(first.items, vec![Item::new("Three Jobless Freaks", "Flipkart", "Test GUID1")]);
        assert_eq!(first.items, second.items);
        assert!(first.next_poll > Utc::now() - Duration::seconds(1));
    }

    #[tokio::test]
    async fn error_path_always_fails() {
        let fetcher = FakeFetcher::for_path("/book/feed/error").unwrap();
        let err = fetcher.fetch().await.unwrap_err();
        assert_eq!(err.to_string(), "mock error");
    }

    #[test]
    fn unknown_path_has_no_fetcher() {
        assert!(FakeFetcher::for_path("/book/feed4/success").is_none());
    }

    #[tokio::test]
    async fn interval_sets_next_poll() {
        let before = Utc::now();
        let batch = FakeFetcher::with_items(vec![])
            .interval(Duration::hours(1))
            .fetch()
            .await
            .unwrap();
        assert!(batch.next_poll >= before + Duration::hours(1));
    }
}
