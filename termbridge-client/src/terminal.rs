//! Terminal initialization and cleanup
//!
//! Raw mode and the alternate screen are entered on construction and left
//! again when the guard drops, including on error paths.

use std::io;

use crossterm::{
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};

use termbridge_utils::Result;

/// Raw-mode terminal guard
pub struct Terminal {
    _private: (),
}

impl Terminal {
    /// Enter raw mode with alternate screen and bracketed paste
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, EnableBracketedPaste)?;
        Ok(Self { _private: () })
    }

    /// Set the window title
    pub fn set_title(&self, title: &str) {
        if let Err(e) = execute!(io::stdout(), SetTitle(title)) {
            tracing::debug!("Failed to set terminal title: {}", e);
        }
    }

    fn restore() -> Result<()> {
        disable_raw_mode()?;
        execute!(io::stdout(), DisableBracketedPaste, LeaveAlternateScreen)?;
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if let Err(e) = Self::restore() {
            tracing::error!("Failed to restore terminal: {}", e);
        }
    }
}
