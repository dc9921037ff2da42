//! Full-screen collection selector.
//!
//! Raw mode is held by a [`TerminalGuard`] for exactly the duration of one
//! [`ItemSelector::select`] call, so the prompts that follow always see a
//! cooked terminal.

mod state;
mod ui;

pub use state::{SelectorAction, SelectorState};

use crate::terminal::TerminalGuard;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use mongo_migrate::{ItemSelector, MigrateError, Result, Selection};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often the loop wakes up to check for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// [`ItemSelector`] drawing a checkbox list with ratatui.
pub struct TerminalSelector {
    cancel: CancellationToken,
}

impl TerminalSelector {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    fn event_loop(&self, guard: &mut TerminalGuard, state: &mut SelectorState) -> Result<Selection> {
        loop {
            guard.terminal().draw(|frame| ui::render(frame, state))?;

            if self.cancel.is_cancelled() {
                return Err(MigrateError::Interrupted);
            }
            if !event::poll(POLL_INTERVAL)? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                if let Some(selection) = action_for(key).and_then(|action| state.apply(action)) {
                    return Ok(selection);
                }
            }
        }
    }
}

impl ItemSelector for TerminalSelector {
    fn select(&mut self, items: &[String]) -> Result<Selection> {
        let mut state = SelectorState::new(items.to_vec());
        let mut guard = TerminalGuard::enter()?;

        let selection = self.event_loop(&mut guard, &mut state);
        guard.restore()?;

        match &selection {
            Ok(Selection::Chosen(chosen)) => debug!("Selector confirmed {} items", chosen.len()),
            Ok(Selection::Cancelled) => debug!("Selector cancelled"),
            Err(e) => debug!("Selector failed: {}", e),
        }
        selection
    }
}

/// Map a key press to a selector action.
pub fn action_for(key: KeyEvent) -> Option<SelectorAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(SelectorAction::Interrupt),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Up | KeyCode::Char('k') => Some(SelectorAction::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(SelectorAction::Down),
        KeyCode::PageUp => Some(SelectorAction::PageUp),
        KeyCode::PageDown => Some(SelectorAction::PageDown),
        KeyCode::Home | KeyCode::Char('g') => Some(SelectorAction::Home),
        KeyCode::End | KeyCode::Char('G') => Some(SelectorAction::End),
        KeyCode::Char(' ') => Some(SelectorAction::Toggle),
        KeyCode::Char('a') => Some(SelectorAction::ToggleAll),
        KeyCode::Enter => Some(SelectorAction::Confirm),
        KeyCode::Char('q') | KeyCode::Esc => Some(SelectorAction::Quit),
        _ => None,
    }
}
