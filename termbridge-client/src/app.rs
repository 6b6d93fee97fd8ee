//! Front-end application
//!
//! Drives one [`SessionMultiplexer`] from the local terminal: keystrokes
//! go to the active tab, prefix commands manage tabs, and each interactive
//! tab renders into its own [`TerminalDisplay`].

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use termbridge_client::bridge::ConnectionState;
use termbridge_client::connection::{Connector, SessionHandler};
use termbridge_client::display::{stdout_sink, OutputSink, TerminalDisplay};
use termbridge_client::input::{InputAction, InputHandler, TabCommand};
use termbridge_client::multiplexer::{SessionMultiplexer, Tab, TabKind};
use termbridge_client::resize::{terminal_geometry, ResizeObserver};
use termbridge_protocol::{Geometry, SessionId};
use termbridge_utils::Result;

use crate::event::{AppEvent, EventHandler};
use crate::terminal::Terminal;

/// How often faults are polled when there is no input
const TICK_RATE: Duration = Duration::from_millis(250);

type Displays = Arc<Mutex<HashMap<SessionId, TerminalDisplay>>>;

fn lock(displays: &Displays) -> MutexGuard<'_, HashMap<SessionId, TerminalDisplay>> {
    displays.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct App {
    multiplexer: SessionMultiplexer,
    displays: Displays,
    sink: OutputSink,
    input: InputHandler,
    resize: ResizeObserver,
    events: EventHandler,
    /// Tab currently shown on the local terminal
    shown: Option<SessionId>,
    quit: bool,
}

impl App {
    /// Create the app and open the initial tab
    pub fn new(connector: Arc<dyn Connector>, input: InputHandler, fallback: Geometry) -> Self {
        let pane = terminal_geometry(fallback);
        let sink = stdout_sink();
        let displays = Displays::default();

        let factory_displays = Arc::clone(&displays);
        let factory_sink = Arc::clone(&sink);
        let handlers = Box::new(move |id: &SessionId| {
            let display = TerminalDisplay::new(pane, Arc::clone(&factory_sink));
            lock(&factory_displays).insert(id.clone(), display.clone());
            Box::new(display) as Box<dyn SessionHandler>
        });

        Self {
            multiplexer: SessionMultiplexer::new(connector, handlers, pane),
            displays,
            sink,
            input,
            resize: ResizeObserver::with_initial(pane),
            events: EventHandler::new(TICK_RATE),
            shown: None,
            quit: false,
        }
    }

    /// Run until the user quits
    pub async fn run(&mut self) -> Result<()> {
        let terminal = Terminal::new()?;
        self.events.start_input_polling();

        // Displays were created at the startup size; catch up with the pane
        let pane = self.multiplexer.pane_geometry();
        for display in lock(&self.displays).values() {
            display.resize(pane);
        }
        self.show_active();
        terminal.set_title(&self.title());

        while !self.quit {
            let Some(event) = self.events.next().await else {
                break;
            };
            match event {
                AppEvent::Input(event) => {
                    let action = self.input.handle_event(event);
                    self.handle_action(action);
                }
                AppEvent::Tick => {}
            }
            self.poll_faults();
            terminal.set_title(&self.title());
        }

        tracing::info!("shutting down");
        self.multiplexer.shutdown();
        Ok(())
    }

    fn handle_action(&mut self, action: InputAction) {
        match action {
            InputAction::None => {}
            InputAction::Forward(bytes) => {
                self.multiplexer.send_input(&bytes);
            }
            InputAction::Command(command) => self.handle_command(command),
            InputAction::Resize { cols, rows } => {
                if let Some(geometry) = self.resize.observe(cols, rows) {
                    for display in lock(&self.displays).values() {
                        display.resize(geometry);
                    }
                    self.multiplexer.resize_pane(geometry.rows, geometry.cols);
                }
            }
            InputAction::Quit => self.quit = true,
        }
    }

    fn handle_command(&mut self, command: TabCommand) {
        let changed = match command {
            TabCommand::NewTab => {
                let count = self.multiplexer.tabs().len();
                let id = self
                    .multiplexer
                    .add_tab(TabKind::InteractiveShell, format!("Terminal {}", count + 1))
                    .id()
                    .clone();
                if let Some(display) = lock(&self.displays).get(&id) {
                    display.resize(self.multiplexer.pane_geometry());
                }
                true
            }
            TabCommand::CloseTab => {
                let id = self.multiplexer.active_tab_id().clone();
                let removed = self.multiplexer.remove_tab(&id);
                if removed {
                    lock(&self.displays).remove(&id);
                    if self.shown.as_ref() == Some(&id) {
                        self.shown = None;
                    }
                }
                removed
            }
            TabCommand::NextTab => self.multiplexer.select_next(),
            TabCommand::PreviousTab => self.multiplexer.select_previous(),
            TabCommand::SelectIndex(index) => self.multiplexer.select_index(index),
        };

        if changed {
            self.show_active();
        }
    }

    fn poll_faults(&mut self) {
        for fault in self.multiplexer.poll_faults() {
            tracing::warn!(session_id = %fault.session_id, "session fault: {}", fault.kind);
        }
    }

    /// Make the active tab's display the live one
    fn show_active(&mut self) {
        let active = self.multiplexer.active_tab_id().clone();
        if self.shown.as_ref() == Some(&active) {
            return;
        }

        let placeholder = {
            let displays = lock(&self.displays);
            if let Some(previous) = self.shown.as_ref().and_then(|id| displays.get(id)) {
                previous.set_live(false);
            }
            let placeholder = match displays.get(&active) {
                Some(display) => {
                    display.set_live(true);
                    None
                }
                None => Some(
                    self.multiplexer
                        .active_tab()
                        .map(|tab| tab.label().to_string())
                        .unwrap_or_default(),
                ),
            };
            placeholder
        };
        if let Some(label) = placeholder {
            self.write_placeholder(&label);
        }
        self.shown = Some(active);
    }

    fn write_placeholder(&self, label: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let result = write!(sink, "\x1b[H\x1b[2J[{}]\r\n", label).and_then(|_| sink.flush());
        if let Err(e) = result {
            tracing::warn!("Failed to draw view placeholder: {}", e);
        }
    }

    fn title(&self) -> String {
        format_title(self.multiplexer.tabs(), self.multiplexer.active_index())
    }
}

/// Window title listing tabs, e.g. `termbridge [1:Terminal*] [2:Logs!]`
///
/// `*` marks the active tab, `!` a failed session and `-` a closed one.
pub fn format_title(tabs: &[Tab], active: usize) -> String {
    let mut title = String::from("termbridge");
    for (index, tab) in tabs.iter().enumerate() {
        let marker = if index == active {
            "*"
        } else if tab.fault().is_some() || tab.state() == Some(ConnectionState::Failed) {
            "!"
        } else if tab.state() == Some(ConnectionState::Closed) {
            "-"
        } else {
            ""
        };
        title.push_str(&format!(" [{}:{}{}]", index, tab.label(), marker));
    }
    title
}
