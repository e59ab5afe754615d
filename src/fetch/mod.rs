//! Fetcher abstraction layer.
//!
//! This module defines the [`Fetcher`] capability and the [`Item`] / [`Batch`]
//! types it produces.  Concrete fetchers live in sub-modules ([`rss`] for real
//! feeds over HTTP, [`fake`] for canned responses).
//!
//! ## Adding a new fetcher
//!
//! 1. Create a new file in this directory (e.g. `atom.rs`).
//! 2. Define a struct and implement [`Fetcher`] for it.
//! 3. Add `mod atom;` below, re-export the struct, and teach
//!    [`fetcher_for`] which addresses it handles.
//!
//! The polling engine, de-duplication, and merging are all fetcher-agnostic.

mod fake;
mod item;
mod rss;

pub use fake::FakeFetcher;
pub use item::Item;
pub use rss::RssFetcher;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ResolveError;

/// The outcome of one successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Items in feed order.  May contain GUIDs already delivered earlier; the
    /// source filters those out.
    pub items: Vec<Item>,
    /// When the feed would like to be polled again.
    pub next_poll: DateTime<Utc>,
}

impl Batch {
    pub fn new(items: Vec<Item>, next_poll: DateTime<Utc>) -> Self {
        Self { items, next_poll }
    }
}

/// Capability that retrieves one batch of items on demand.
///
/// A source owns exactly one fetcher and never runs two fetches against it at
/// the same time.  Each call runs on its own spawned task, so implementations
/// must be [`Send`] + [`Sync`].  A fetch that hangs forever does not prevent
/// its source from closing; the source aborts the task.
///
/// ```ignore
/// struct MyFetcher;
///
/// #[async_trait]
/// impl Fetcher for MyFetcher {
///     async fn fetch(&self) -> Result<Batch> {
///         // Perform HTTP / IO, then convert into Item values.
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the latest batch of items.
    ///
    /// Errors are transient from the caller's point of view: the source logs
    /// them, backs off, and tries again later.
    async fn fetch(&self) -> Result<Batch>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Box<F> {
    async fn fetch(&self) -> Result<Batch> {
        (**self).fetch().await
    }
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self) -> Result<Batch> {
        (**self).fetch().await
    }
}

/// Resolve a feed address into a fetcher.
///
/// * `http://…` / `https://…` — an [`RssFetcher`] labelled with the host.
/// * one of the canned [`FakeFetcher`] paths (e.g. `/book/feed1/success`).
pub fn fetcher_for(address: &str) -> Result<Box<dyn Fetcher>, ResolveError> {
    if address.starts_with("http://") || address.starts_with("https://") {
        let label = host_of(address).unwrap_or(address);
        return Ok(Box::new(RssFetcher::new(address, label)?));
    }

    FakeFetcher::for_path(address)
        .map(|f| Box::new(f) as Box<dyn Fetcher>)
        .ok_or_else(|| ResolveError::UnknownAddress(address.to_string()))
}

/// `https://feeds.example.com/rss.xml` → `feeds.example.com`.
fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://")?.1;
    let host = rest.split(['/', '?', '#']).next()?;
    (!host.is_empty()).then_some(host)
}
