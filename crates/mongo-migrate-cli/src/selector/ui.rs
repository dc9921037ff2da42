//! Rendering of the collection selector.

use super::state::SelectorState;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

const HELP: &str = "↑/↓ move  PgUp/PgDn page  space toggle  a all  enter confirm  q quit";

/// Render the selector and report the list height back to `state`.
pub fn render(frame: &mut Frame, state: &mut SelectorState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Title + help
            Constraint::Min(3),    // List
            Constraint::Length(1), // Status
        ])
        .split(frame.area());

    state.set_capacity(chunks[1].height.saturating_sub(2) as usize);

    render_header(frame, chunks[0]);
    render_list(frame, state, chunks[1]);
    render_status(frame, state, chunks[2]);
}

fn render_header(frame: &mut Frame, area: Rect) {
    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            " Select collections to migrate",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!(" {}", HELP),
            Style::default().fg(Color::DarkGray),
        )),
    ]);
    frame.render_widget(header, area);
}

fn render_list(frame: &mut Frame, state: &SelectorState, area: Rect) {
    let total = state.items().len();
    let items: Vec<ListItem> = state
        .visible()
        .map(|(i, item)| {
            let mark = if state.is_selected(item) { "[x]" } else { "[ ]" };
            let style = if i == state.cursor() {
                Style::default()
                    .bg(Color::Blue)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::raw(" "),
                Span::styled(format!("{} {}", mark, item), style),
            ]))
        })
        .collect();

    let shown = items.len();
    let title = if shown < total {
        format!(
            " Collections {}-{} of {} ",
            state.offset() + 1,
            state.offset() + shown,
            total
        )
    } else {
        format!(" Collections ({}) ", total)
    };

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(list, area);
}

fn render_status(frame: &mut Frame, state: &SelectorState, area: Rect) {
    let line = match state.warning() {
        Some(warning) => Line::from(Span::styled(
            format!(" {}", warning),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        None => Line::from(format!(
            " {} of {} selected",
            state.selected_count(),
            state.items().len()
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use super::super::state::SelectorAction;
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    fn draw(state: &mut SelectorState, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| render(frame, state)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_renders_marks_and_count() {
        let mut state = SelectorState::new(vec!["orders".into(), "users".into()]);
        state.apply(SelectorAction::Down);
        state.apply(SelectorAction::Toggle);
        let screen = draw(&mut state, 60, 10);
        assert!(screen.contains("[ ] orders"));
        assert!(screen.contains("[x] users"));
        assert!(screen.contains("1 of 2 selected"));
        assert!(screen.contains("Collections (2)"));
    }

    #[test]
    fn test_capacity_follows_terminal_height() {
        let mut state = SelectorState::new((0..50).map(|i| format!("c{i}")).collect());
        let screen = draw(&mut state, 60, 10);
        // 10 rows minus header, status and borders
        assert_eq!(state.visible().count(), 5);
        assert!(screen.contains("Collections 1-5 of 50"));
    }

    #[test]
    fn test_warning_replaces_status() {
        let mut state = SelectorState::new(vec!["orders".into()]);
        state.apply(SelectorAction::Confirm);
        let screen = draw(&mut state, 80, 8);
        assert!(screen.contains("Select at least one collection"));
    }
}
