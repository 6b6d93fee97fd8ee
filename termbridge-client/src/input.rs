//! Keyboard input handling
//!
//! Keystrokes go to the active tab unless they follow the prefix key, in
//! which case the next key selects a tab command (tmux style).

mod keys;

pub use keys::translate_key;

use std::time::{Duration, Instant};

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use termbridge_utils::{Result, TermbridgeError};

/// Default prefix key timeout in milliseconds
const DEFAULT_PREFIX_TIMEOUT_MS: u64 = 500;

/// Input handling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Keys go to the active tab
    Normal,
    /// Prefix pressed, waiting for a command key
    PrefixPending,
}

/// Tab operations bound to prefix commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabCommand {
    NewTab,
    CloseTab,
    NextTab,
    PreviousTab,
    SelectIndex(usize),
}

/// Result of processing an input event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    /// Bytes for the active tab's session
    Forward(Vec<u8>),
    Command(TabCommand),
    /// Local terminal changed size
    Resize { cols: u16, rows: u16 },
    Quit,
}

/// Prefix key state machine
pub struct InputHandler {
    mode: InputMode,
    prefix: KeyEvent,
    prefix_timeout: Duration,
    /// Time when prefix was pressed
    prefix_time: Option<Instant>,
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHandler {
    /// Handler with the `Ctrl-b` prefix
    pub fn new() -> Self {
        Self::with_prefix(KeyEvent::new(KeyCode::Char('b'), KeyModifiers::CONTROL))
    }

    pub fn with_prefix(prefix: KeyEvent) -> Self {
        Self {
            mode: InputMode::Normal,
            prefix,
            prefix_timeout: Duration::from_millis(DEFAULT_PREFIX_TIMEOUT_MS),
            prefix_time: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.prefix_timeout = timeout;
        self
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Process a crossterm event
    pub fn handle_event(&mut self, event: Event) -> InputAction {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key),
            Event::Key(_) => InputAction::None,
            Event::Resize(cols, rows) => InputAction::Resize { cols, rows },
            Event::Paste(text) => InputAction::Forward(text.into_bytes()),
            Event::Mouse(_) | Event::FocusGained | Event::FocusLost => InputAction::None,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        self.check_prefix_timeout();

        match self.mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::PrefixPending => self.handle_prefix_key(key),
        }
    }

    fn check_prefix_timeout(&mut self) {
        if let Some(time) = self.prefix_time {
            if time.elapsed() > self.prefix_timeout {
                self.mode = InputMode::Normal;
                self.prefix_time = None;
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> InputAction {
        if self.is_prefix_key(&key) {
            self.mode = InputMode::PrefixPending;
            self.prefix_time = Some(Instant::now());
            return InputAction::None;
        }

        match translate_key(&key) {
            Some(bytes) => InputAction::Forward(bytes),
            None => InputAction::None,
        }
    }

    fn handle_prefix_key(&mut self, key: KeyEvent) -> InputAction {
        self.mode = InputMode::Normal;
        self.prefix_time = None;

        // Prefix twice sends it literally
        if self.is_prefix_key(&key) {
            return match translate_key(&key) {
                Some(bytes) => InputAction::Forward(bytes),
                None => InputAction::None,
            };
        }

        match key.code {
            KeyCode::Char('c') => InputAction::Command(TabCommand::NewTab),
            KeyCode::Char('x') => InputAction::Command(TabCommand::CloseTab),
            KeyCode::Char('n') => InputAction::Command(TabCommand::NextTab),
            KeyCode::Char('p') => InputAction::Command(TabCommand::PreviousTab),
            KeyCode::Char(c @ '0'..='9') => {
                let index = c as usize - '0' as usize;
                InputAction::Command(TabCommand::SelectIndex(index))
            }
            KeyCode::Char('d') | KeyCode::Char('q') => InputAction::Quit,
            _ => InputAction::None,
        }
    }

    fn is_prefix_key(&self, key: &KeyEvent) -> bool {
        key.code == self.prefix.code && key.modifiers == self.prefix.modifiers
    }
}

/// Parse a prefix binding such as `Ctrl-b`, `C-a` or `Ctrl+Space`
pub fn parse_prefix(binding: &str) -> Result<KeyEvent> {
    let invalid = || TermbridgeError::config(format!("invalid prefix key: {:?}", binding));

    let (modifier, key) = binding
        .split_once(|c: char| c == '-' || c == '+')
        .ok_or_else(invalid)?;
    if !matches!(modifier.to_ascii_lowercase().as_str(), "ctrl" | "c") {
        return Err(invalid());
    }

    let c = match key.to_ascii_lowercase().as_str() {
        "space" => ' ',
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if keys::control_code(c).is_some() => c,
                _ => return Err(invalid()),
            }
        }
    };

    Ok(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
}
