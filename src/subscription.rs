//! The stream-plus-close capability shared by sources and mergers.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CloseError;
use crate::fetch::Item;

/// A live stream of [`Item`]s that must eventually be shut down.
///
/// Both [`Source`](crate::Source) and [`Aggregator`](crate::Aggregator)
/// implement this, so an aggregator may merge other aggregators.
#[async_trait]
pub trait Subscription: Send {
    /// The item stream.  Yields `None` once the subscription has terminated.
    fn updates(&mut self) -> &mut mpsc::Receiver<Item>;

    /// Stop the subscription and wait for it to wind down.
    ///
    /// Returns the subscription's terminal error, if any.  Calling it a second
    /// time returns [`CloseError::AlreadyClosed`].
    async fn close(&mut self) -> Result<(), CloseError>;
}

#[async_trait]
impl<S: Subscription + ?Sized> Subscription for Box<S> {
    fn updates(&mut self) -> &mut mpsc::Receiver<Item> {
        (**self).updates()
    }

    async fn close(&mut self) -> Result<(), CloseError> {
        (**self).close().await
    }
}

/// Discard whatever is still buffered in a terminated stream so callers see
/// nothing after `close()` returns.  Returns how many items were dropped.
pub(crate) fn discard_buffered(rx: &mut mpsc::Receiver<Item>) -> usize {
    rx.close();
    let mut dropped = 0;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}
