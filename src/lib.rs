//! feedmux — poll many feeds, merge them into one deduplicated stream.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌─────────┐  Batch   ┌──────────┐  Item   ┌────────────┐  Item
//! │ Fetcher │ ───────► │  Source  │ ──────► │ Aggregator │ ──────► consumer
//! │ (fetch) │          │ (poll.rs)│         │ (merge.rs) │
//! └─────────┘          └──────────┘         └────────────┘
//!      ▲ one per feed        ▲ one task each       ▲ one forwarder per member
//! ```
//!
//! * **`fetch`** — the [`Fetcher`] capability, the [`Item`] record, and the
//!   RSS / canned implementations.
//! * **`poll`** — [`Source`]: per-feed scheduler that fetches, de-duplicates,
//!   buffers, and paces items.
//! * **`merge`** — [`Aggregator`]: fan-in of many subscriptions with a
//!   coordinated close.
//! * **`subscription`** — the [`Subscription`] trait both of the above share.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use feedmux::{fetcher_for, Aggregator, Source, Subscription};
//!
//! let mut merged = Aggregator::new(vec![
//!     Box::new(Source::new(fetcher_for("/book/feed1/success")?)) as Box<dyn Subscription>,
//!     Box::new(Source::new(fetcher_for("/book/feed2/success")?)),
//! ]);
//! while let Some(item) = merged.updates().recv().await {
//!     println!("{item}");
//! #   break;
//! }
//! merged.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fetch;
pub mod merge;
pub mod poll;
pub mod subscription;

pub use error::{CloseError, ResolveError};
pub use fetch::{fetcher_for, Batch, FakeFetcher, Fetcher, Item, RssFetcher};
pub use merge::Aggregator;
pub use poll::{Source, SourceConfig};
pub use subscription::Subscription;
