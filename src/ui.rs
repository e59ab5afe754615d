//! Terminal UI rendering.
//!
//! Pure drawing: reads [`App`] state and renders a scrollable list of merged
//! items above a one-line status bar.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::app::App;

/// Width of the channel column, in cells.
const CHANNEL_WIDTH: usize = 14;

/// Draw the complete UI for one frame.
pub fn draw(app: &mut App, frame: &mut Frame) {
    let [main_area, status_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

    draw_item_list(app, frame, main_area);
    draw_status_bar(app, frame, status_area);
}

fn draw_item_list(app: &mut App, frame: &mut Frame, area: Rect) {
    let list_items: Vec<ListItem> = app
        .items
        .iter()
        .map(|item| {
            let channel: String = item.channel.chars().take(CHANNEL_WIDTH).collect();
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{channel:<width$}", width = CHANNEL_WIDTH),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(" "),
                Span::styled(&item.title, Style::default().fg(Color::White)),
            ]))
        })
        .collect();

    let title = format!(" feedmux · {} feeds · {} channels ", app.feeds, app.per_channel.len());
    let list = List::new(list_items)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol("▸ ");

    frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn draw_status_bar(app: &App, frame: &mut Frame, area: Rect) {
    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(
            format!("{} items", app.items.len()),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  "),
        Span::styled(&app.status, Style::default().fg(Color::Yellow)),
        Span::raw("  q: quit  ↑/↓: scroll  Home/End: jump"),
    ]));
    frame.render_widget(status, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedmux::Item;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use crate::input::Action;

    fn screen_text(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 12)).unwrap();
        terminal.draw(|f| draw(app, f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn draws_empty_screen() {
        let mut app = App::new(3);
        let text = screen_text(&mut app);
        assert!(text.contains("0 items"));
        assert!(text.contains("3 feeds"));
    }

    #[test]
    fn draws_items_with_channel() {
        let mut app = App::new(2);
        app.push_item(Item::new("Five Point Someone", "Amazon", "g2"));
        app.push_item(Item::new("Three Jobless Freaks", "Flipkart", "g1"));
        app.apply(Action::First);

        let text = screen_text(&mut app);
        assert!(text.contains("Five Point Someone"));
        assert!(text.contains("Flipkart"));
        assert!(text.contains("2 items"));
        assert!(text.contains("2 channels"));
    }
}
