//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::Parser;

/// Feeds used when none are given: the three canned demo feeds.
pub const DEFAULT_FEEDS: [&str; 3] = [
    "/book/feed1/success",
    "/book/feed2/success",
    "/book/feed3/success",
];

#[derive(Parser, Debug)]
#[command(
    name = "feedmux",
    about = "Merge several polled feeds into one live, deduplicated stream"
)]
pub struct Cli {
    /// Feed addresses: http(s) RSS URLs or canned paths such as /book/feed1/success
    #[arg(env = "FEEDMUX_FEEDS", value_delimiter = ',', default_values = DEFAULT_FEEDS)]
    pub feeds: Vec<String>,

    /// Print "<channel> <title>" lines instead of starting the terminal UI
    #[arg(long)]
    pub print: bool,

    /// In --print mode, close the merged stream after this many seconds
    #[arg(long, value_name = "SECS", default_value_t = 3)]
    pub close_after: u64,

    /// Write logs to this file (the only log sink in UI mode)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}
