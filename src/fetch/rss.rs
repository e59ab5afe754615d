//! RSS feed fetcher.
//!
//! Retrieves an RSS 2.0 document over HTTP with [`reqwest`] and converts its
//! items with the [`rss`] crate.  The channel's `<ttl>` drives the next poll
//! time, so well-behaved feeds get polled exactly as often as they ask.

use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{Batch, Fetcher, Item};

/// Poll interval (seconds) used when the channel carries no usable `<ttl>`.
const DEFAULT_POLL_SECS: i64 = 60;

/// Upper bound on one HTTP round trip, body included.
const FETCH_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// An RSS feed fetcher.
pub struct RssFetcher {
    /// The feed URL to poll.
    pub url: String,
    /// Channel name used when the document does not carry a `<title>`.
    pub label: String,
    client: reqwest::Client,
}

impl RssFetcher {
    /// Create a new RSS fetcher.
    ///
    /// # Arguments
    ///
    /// * `url` — full URL of the RSS feed (e.g.
    ///   `https://feeds.bbci.co.uk/news/rss.xml`).
    /// * `label` — fallback channel name for items from this feed.
    ///
    /// Requests give up after thirty seconds; a stalled server becomes a failed
    /// fetch.
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> reqwest::Result<Self> {
        Self::with_timeout(url, label, FETCH_TIMEOUT)
    }

    pub fn with_timeout(
        url: impl Into<String>,
        label: impl Into<String>,
        timeout: StdDuration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            label: label.into(),
            client,
        })
    }

    /// Parse an already-fetched [`rss::Channel`] into [`Item`]s.
    ///
    /// This is a pure function (no I/O) so that tests can exercise the
    /// parsing logic without hitting the network.
    pub fn parse_channel(channel: &rss::Channel, label: &str) -> Vec<Item> {
        let channel_name = if channel.title().trim().is_empty() {
            label
        } else {
            channel.title()
        };

        channel
            .items()
            .iter()
            .map(|item| {
                // Prefer <guid>, fall back to <link>, then empty string.
                let guid = item
                    .guid()
                    .map(|g| g.value().to_string())
                    .or_else(|| item.link().map(String::from))
                    .unwrap_or_default();

                Item {
                    title: item.title().unwrap_or("(untitled)").to_string(),
                    channel: channel_name.to_string(),
                    guid,
                }
            })
            .collect()
    }

    /// When to poll again, honouring the channel's `<ttl>` (in minutes).
    pub fn next_poll(channel: &rss::Channel, now: DateTime<Utc>) -> DateTime<Utc> {
        let ttl = channel
            .ttl()
            .and_then(|t| t.trim().parse::<i64>().ok())
            .filter(|&minutes| minutes > 0)
            .map(Duration::minutes)
            .unwrap_or_else(|| Duration::seconds(DEFAULT_POLL_SECS));
        now + ttl
    }
}

#[async_trait]
impl Fetcher for RssFetcher {
    async fn fetch(&self) -> Result<Batch> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("GET {}", self.url))?
            .bytes()
            .await?;
        let channel = rss::Channel::read_from(body.as_ref())
            .with_context(|| format!("parse RSS from {}", self.url))?;

        let items = Self::parse_channel(&channel, &self.label);
        Ok(Batch::new(items, Self::next_poll(&channel, Utc::now())))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
