//! Terminal UI state.
//!
//! Holds the merged items in arrival order (newest on top), the scroll
//! position, and the status line.  Rendering lives in [`crate::ui`] and key
//! mapping in [`crate::input`].

use std::collections::BTreeMap;

use ratatui::widgets::ListState;

use feedmux::Item;

use crate::input::Action;

/// Oldest items are dropped once the view holds this many.
const MAX_ITEMS: usize = 1000;

pub struct App {
    /// Received items, newest first.
    pub items: Vec<Item>,
    /// Items received per channel since start.
    pub per_channel: BTreeMap<String, usize>,
    /// List selection state for scrolling.
    pub list_state: ListState,
    /// Whether the user has requested to quit.
    pub quit: bool,
    /// Status message shown in the bottom bar.
    pub status: String,
    /// Number of feeds being merged.
    pub feeds: usize,
}

impl App {
    pub fn new(feeds: usize) -> Self {
        Self {
            items: Vec::new(),
            per_channel: BTreeMap::new(),
            list_state: ListState::default(),
            quit: false,
            status: format!("Polling {feeds} feeds…"),
            feeds,
        }
    }

    /// Record a newly merged item at the top of the list.
    ///
    /// The selection follows the item it was on, so new arrivals don't move
    /// the highlight out from under the reader.
    pub fn push_item(&mut self, item: Item) {
        *self.per_channel.entry(item.channel.clone()).or_default() += 1;
        self.status = format!("{}: {}", item.channel, item.title);
        self.items.insert(0, item);
        self.items.truncate(MAX_ITEMS);

        if let Some(i) = self.list_state.selected() {
            self.list_state.select(Some((i + 1).min(self.items.len() - 1)));
        }
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Quit => self.quit = true,
            Action::Next => self.select_next(),
            Action::Previous => self.select_previous(),
            Action::First => self.select_first(),
            Action::Last => self.select_last(),
        }
    }

    // -- navigation ----------------------------------------------------------

    fn select_next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => (i + 1).min(self.items.len() - 1),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    fn select_previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = self.list_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.list_state.select(Some(i));
    }

    fn select_first(&mut self) {
        if !self.items.is_empty() {
            self.list_state.select(Some(0));
        }
    }

    fn select_last(&mut self) {
        if !self.items.is_empty() {
            self.list_state.select(Some(self.items.len() - 1));
        }
    }
}
