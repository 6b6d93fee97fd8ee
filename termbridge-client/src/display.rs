//! Terminal display sink
//!
//! Each interactive tab gets a [`TerminalDisplay`]: a vt100 parser that
//! keeps the tab's screen so it can be repainted when the tab is selected.
//! Output of the live (active) tab is also written straight through to the
//! local terminal.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use termbridge_protocol::Geometry;

use crate::bridge::FaultKind;
use crate::connection::SessionHandler;

/// Notice rendered locally once a session has ended
pub const CLOSED_NOTICE: &[u8] = b"\r\n\x1b[31mTerminal connection closed.\x1b[0m\r\n";

/// Scrollback kept per tab
const SCROLLBACK_LINES: usize = 1000;

/// Where live output is written
pub type OutputSink = Arc<Mutex<dyn Write + Send>>;

/// Sink writing to the process's stdout
pub fn stdout_sink() -> OutputSink {
    Arc::new(Mutex::new(io::stdout()))
}

struct DisplayState {
    parser: vt100::Parser,
    live: bool,
    /// Set once the closure notice was rendered
    ended: bool,
}

/// Screen state of one tab
///
/// Clones share the same screen, so one clone can serve as the session
/// handler while the front-end keeps another.
#[derive(Clone)]
pub struct TerminalDisplay {
    state: Arc<Mutex<DisplayState>>,
    sink: OutputSink,
}

impl TerminalDisplay {
    pub fn new(geometry: Geometry, sink: OutputSink) -> Self {
        Self {
            state: Arc::new(Mutex::new(DisplayState {
                parser: vt100::Parser::new(geometry.rows, geometry.cols, SCROLLBACK_LINES),
                live: false,
                ended: false,
            })),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_live(&self) -> bool {
        self.lock().live
    }

    pub fn has_ended(&self) -> bool {
        self.lock().ended
    }

    /// Make this display the one shown on the local terminal
    ///
    /// Going live repaints the whole screen from the parser.
    pub fn set_live(&self, live: bool) {
        let mut state = self.lock();
        let was_live = state.live;
        state.live = live;

        if live && !was_live {
            let screen = state.parser.screen();
            let (row, col) = screen.cursor_position();

            let mut frame = b"\x1b[H\x1b[2J".to_vec();
            frame.extend(screen.contents_formatted());
            frame.extend(format!("\x1b[{};{}H", row + 1, col + 1).into_bytes());
            drop(state);
            self.write_through(&frame);
        }
    }

    /// Resize the screen model to a new pane geometry
    pub fn resize(&self, geometry: Geometry) {
        if geometry.is_valid() {
            self.lock().parser.set_size(geometry.rows, geometry.cols);
        }
    }

    /// Plain-text contents of the visible screen
    pub fn contents(&self) -> String {
        self.lock().parser.screen().contents()
    }

    fn feed(&self, bytes: &[u8]) {
        let live = {
            let mut state = self.lock();
            state.parser.process(bytes);
            state.live
        };
        if live {
            self.write_through(bytes);
        }
    }

    fn end(&self) {
        {
            let mut state = self.lock();
            if state.ended {
                return;
            }
            state.ended = true;
        }
        self.feed(CLOSED_NOTICE);
    }

    fn write_through(&self, bytes: &[u8]) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = sink.write_all(bytes).and_then(|_| sink.flush()) {
            tracing::warn!("Failed to write terminal output: {}", e);
        }
    }
}

impl SessionHandler for TerminalDisplay {
    fn on_output(&mut self, bytes: &[u8]) {
        self.feed(bytes);
    }

    fn on_closed(&mut self) {
        self.end();
    }

    fn on_failed(&mut self, fault: &FaultKind) {
        tracing::debug!("rendering closure notice after fault: {}", fault);
        self.end();
    }
}
