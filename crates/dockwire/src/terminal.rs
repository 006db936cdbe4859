//! Local terminal handling for interactive sessions.

use std::io;
use std::io::IsTerminal;

use crossterm::terminal;
use tracing::debug;

/// Puts the local terminal in raw mode and restores it on drop.
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    /// Enables raw mode when `wanted` and stdin is a terminal; otherwise the
    /// guard does nothing.
    pub fn enable(wanted: bool) -> io::Result<Self> {
        if !wanted || !io::stdin().is_terminal() {
            return Ok(Self { active: false });
        }
        terminal::enable_raw_mode()?;
        debug!("Raw mode enabled");
        Ok(Self { active: true })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// Local terminal size as `(rows, cols)`, if stdout is a terminal.
pub fn size() -> Option<(u16, u16)> {
    if !io::stdout().is_terminal() {
        return None;
    }
    terminal::size().ok().map(|(cols, rows)| (rows, cols))
}
