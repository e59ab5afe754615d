//! The record that flows through every stage of the pipeline.
//!
//! Fetchers convert whatever their native format is into `Item`s; sources,
//! the merger, and the driver only ever see this type.

use std::fmt;

/// A single update, normalised from any feed.
///
/// Items are plain values: once a fetcher produces one it is never mutated,
/// only moved or cloned further down the pipeline.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Item {
    /// Human-readable headline.
    pub title: String,

    /// Name of the feed / channel this item belongs to (e.g. "Amazon").
    pub channel: String,

    /// De-duplication key.
    ///
    /// Unique within one source only. Two different sources may legitimately
    /// emit items sharing a GUID and the merger will forward both.
    pub guid: String,
}

impl Item {
    pub fn new(
        title: impl Into<String>,
        channel: impl Into<String>,
        guid: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            channel: channel.into(),
            guid: guid.into(),
        }
    }
}

/// `"<channel> <title>"`, the line format used by the plain printer.
impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.channel, self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_channel_then_title() {
        let item = Item::new("Five Point Someone", "Amazon", "g2");
        assert_eq!(item.to_string(), "Amazon Five Point Someone");
    }

    #[test]
    fn equality_covers_every_field() {
        let a = Item::new("T", "C", "G");
        assert_eq!(a, Item::new("T", "C", "G"));
        assert_ne!(a, Item::new("T", "C", "other"));
        assert_ne!(a, Item::new("T", "other", "G"));
    }
}
