//! Raw-mode terminal handling shared by the selector, the panic hook and the
//! signal handler.

use crossterm::{
    cursor, execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, is_raw_mode_enabled, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::panic;

/// Type alias for the terminal backend.
pub type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Raw mode plus alternate screen for as long as the guard lives.
pub struct TerminalGuard {
    terminal: Tui,
    active: bool,
}

impl TerminalGuard {
    /// Switch the terminal to raw mode on the alternate screen.
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }

        let terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(terminal) => terminal,
            Err(e) => {
                reset();
                return Err(e);
            }
        };
        let mut guard = Self {
            terminal,
            active: true,
        };
        guard.terminal.hide_cursor()?;
        Ok(guard)
    }

    pub fn terminal(&mut self) -> &mut Tui {
        &mut self.terminal
    }

    /// Leave raw mode and the alternate screen, reporting failures.
    pub fn restore(mut self) -> io::Result<()> {
        self.active = false;
        restore_terminal(&mut self.terminal)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = restore_terminal(&mut self.terminal);
        }
    }
}

fn restore_terminal(terminal: &mut Tui) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

/// Best-effort restore from any state: raw mode off, alternate screen left,
/// cursor shown. Safe to call when the terminal is already normal.
pub fn reset() {
    if is_raw_mode_enabled().unwrap_or(false) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
    }
    // dialoguer hides the cursor on stderr during selects
    let _ = execute!(io::stderr(), cursor::Show);
}

/// Install a panic hook that restores the terminal before panicking.
pub fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        reset();
        original_hook(panic_info);
    }));
}
