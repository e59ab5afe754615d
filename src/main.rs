//! feedmux — merge several polled feeds into one live stream.
//!
//! ```text
//! ┌────────────┐  Item   ┌──────────┐  draw()  ┌──────────┐
//! │ Aggregator │ ──────► │  app.rs  │ ───────► │  ui.rs   │
//! │  (library) │ (chan)  │ (state)  │          │ (render) │
//! └────────────┘         └──────────┘          └──────────┘
//!                             ▲ Action
//!                        ┌──────────┐
//!                        │ input.rs │
//!                        └──────────┘
//! ```
//!
//! * **`cli`** — argument parsing.
//! * **`app` / `ui` / `input`** — the terminal UI (default mode).  [`Screen`]
//!   holds raw mode for the life of the UI loop and a panic hook undoes it.
//! * `--print` skips the UI and writes one line per item instead, closing the
//!   stream after `--close-after` seconds.

mod app;
mod cli;
mod input;
mod ui;

use std::fs::File;
use std::io;
use std::sync::{Mutex, Once};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    cursor::Show,
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_subscriber::EnvFilter;

use feedmux::{fetcher_for, Aggregator, CloseError, Source, SourceConfig, Subscription};

use app::App;
use cli::Cli;

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

/// Put the terminal back in cooked mode on the main screen.  Safe to call
/// more than once; every step is best effort.
fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
}

/// Owns the terminal while the UI runs.  Raw mode and the alternate screen
/// last exactly as long as this value.
struct Screen {
    tui: Tui,
}

impl Screen {
    fn enter() -> Result<Self> {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            // A panic message printed on the alternate screen is lost.
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                restore_terminal();
                previous(info);
            }));
        });

        enable_raw_mode().context("enable raw mode")?;
        let tui = execute!(io::stdout(), EnterAlternateScreen)
            .map_err(anyhow::Error::from)
            .and_then(|()| Ok(Terminal::new(CrosstermBackend::new(io::stdout()))?));
        match tui {
            Ok(tui) => Ok(Self { tui }),
            Err(e) => {
                restore_terminal();
                Err(e.context("enter alternate screen"))
            }
        }
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        restore_terminal();
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_tracing(args: &Cli) -> Result<()> {
    let filter = std::env::var("FEEDMUX_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter));

    match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("create log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None if args.print => builder.with_writer(io::stderr).init(),
        // The terminal belongs to the UI.
        None => {}
    }
    Ok(())
}

/// One source per feed address, merged.
fn subscribe_all(feeds: &[String]) -> Result<Aggregator> {
    let mut members: Vec<Box<dyn Subscription>> = Vec::with_capacity(feeds.len());
    for address in feeds {
        let fetcher = fetcher_for(address)?;
        let source = Source::with_config(fetcher, SourceConfig::labelled(address.as_str()));
        members.push(Box::new(source));
    }
    tracing::info!(feeds = feeds.len(), "subscribed");
    Ok(Aggregator::new(members))
}

fn describe(result: &Result<(), CloseError>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(e) => e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Print the merged stream until the deadline or Ctrl-C, then close it.
async fn run_print(mut merged: Aggregator, close_after: Duration) -> Result<()> {
    let deadline = tokio::time::sleep(close_after);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(deadline, ctrl_c);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut ctrl_c => {
                tracing::info!("received ctrl-c, closing");
                break;
            }
            next = merged.updates().recv() => match next {
                Some(item) => println!("{item}"),
                None => break,
            },
        }
    }

    let result = merged.close().await;
    println!("closed: {}", describe(&result));
    Ok(())
}

/// Run the terminal UI until the user quits, then close the stream.
async fn run_ui(mut merged: Aggregator, feeds: usize) -> Result<()> {
    // The UI loop blocks on terminal input, so keep it off the async workers.
    let outcome = tokio::task::block_in_place(|| ui_loop(&mut merged, feeds));

    // The screen is restored by now; printing lands on the main buffer.
    let result = merged.close().await;
    outcome?;
    println!("closed: {}", describe(&result));
    Ok(())
}

fn ui_loop(merged: &mut Aggregator, feeds: usize) -> Result<()> {
    let mut screen = Screen::enter()?;
    let mut app = App::new(feeds);

    // ~10 fps.  Each tick: drain merged items, render, poll input.
    let tick_rate = Duration::from_millis(100);

    while !app.quit {
        while let Ok(item) = merged.updates().try_recv() {
            app.push_item(item);
        }

        screen.tui.draw(|f| ui::draw(&mut app, f))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if let Some(action) = input::action_for(key) {
                    app.apply(action);
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args)?;

    let merged = subscribe_all(&args.feeds)?;

    if args.print {
        run_print(merged, Duration::from_secs(args.close_after)).await
    } else {
        run_ui(merged, args.feeds.len()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn subscribe_all_merges_demo_feeds() {
        let feeds: Vec<String> = cli::DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect();
        let mut merged = subscribe_all(&feeds).unwrap();

        let mut channels = Vec::new();
        for _ in 0..3 {
            channels.push(merged.updates().recv().await.unwrap().channel);
        }
        channels.sort();
        assert_eq!(channels, vec!["Amazon", "Amazon", "Flipkart"]);

        assert!(merged.close().await.is_ok());
    }

    #[tokio::test]
    async fn subscribe_all_rejects_unknown_address() {
        let feeds = vec!["/book/feed1/success".to_string(), "ftp://nope".to_string()];
        let err = subscribe_all(&feeds).err().unwrap();
        assert!(err.to_string().contains("ftp://nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn error_feed_is_reported_on_close() {
        let feeds = vec!["/book/feed/error".to_string()];
        let mut merged = subscribe_all(&feeds).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = merged.close().await;
        assert_eq!(describe(&result), "last fetch failed: mock error");
    }

    #[test]
    fn describe_ok() {
        assert_eq!(describe(&Ok(())), "ok");
    }
}
