//! Error types surfaced by subscriptions and fetcher resolution.
//!
//! Individual fetch failures are plain [`anyhow::Error`]s; they never travel
//! on an item stream.  They only reach a caller wrapped in
//! [`CloseError::Fetch`] as the result of `close()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloseError {
    /// The most recent completed fetch failed.
    #[error("last fetch failed: {0:#}")]
    Fetch(#[source] anyhow::Error),

    #[error("subscription already closed")]
    AlreadyClosed,

    /// The scheduler task went away without acknowledging the close request.
    #[error("subscription task ended without acknowledging close")]
    Gone,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no fetcher for address: {0}")]
    UnknownAddress(String),

    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}
