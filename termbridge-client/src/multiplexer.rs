//! Tab collection and session lifecycle
//!
//! The [`SessionMultiplexer`] owns the ordered set of open tabs, hands each
//! interactive tab its own [`SessionBridge`], and keeps the active selection
//! consistent as tabs come and go.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use termbridge_protocol::{Geometry, SessionId};

use crate::bridge::{ConnectionState, FaultKind, SessionBridge, SessionFault};
use crate::connection::{Connector, SessionHandler};

/// Label of the tab every multiplexer starts with
pub const INITIAL_TAB_LABEL: &str = "Terminal";

/// Builds the display sink for a newly opened session
pub type HandlerFactory = Box<dyn FnMut(&SessionId) -> Box<dyn SessionHandler> + Send>;

/// What a tab shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabKind {
    /// Remote shell; owns a session bridge
    InteractiveShell,
    /// Embedded view with no terminal session behind it
    AuxiliaryView,
}

impl TabKind {
    fn id_prefix(self) -> &'static str {
        match self {
            Self::InteractiveShell => "terminal",
            Self::AuxiliaryView => "view",
        }
    }
}

/// One open tab
pub struct Tab {
    id: SessionId,
    kind: TabKind,
    label: String,
    bridge: Option<SessionBridge>,
    /// Last fault reported by this tab's bridge
    fault: Option<FaultKind>,
}

impl Tab {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn kind(&self) -> TabKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bridge(&self) -> Option<&SessionBridge> {
        self.bridge.as_ref()
    }

    /// Connection state of the tab's session, if it has one
    pub fn state(&self) -> Option<ConnectionState> {
        self.bridge.as_ref().map(SessionBridge::state)
    }

    pub fn fault(&self) -> Option<&FaultKind> {
        self.fault.as_ref()
    }
}

impl fmt::Debug for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tab")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("state", &self.state())
            .field("fault", &self.fault)
            .finish()
    }
}

/// Owns every open tab and the active selection
///
/// The collection is never empty: construction opens an initial shell tab,
/// and removing the last remaining tab does nothing.
pub struct SessionMultiplexer {
    tabs: Vec<Tab>,
    active: SessionId,
    /// Geometry of the shared terminal pane
    pane: Geometry,
    connector: Arc<dyn Connector>,
    handlers: HandlerFactory,
    faults_tx: mpsc::UnboundedSender<SessionFault>,
    faults_rx: mpsc::UnboundedReceiver<SessionFault>,
}

impl SessionMultiplexer {
    /// Create a multiplexer holding one interactive tab
    ///
    /// Must be called from within a Tokio runtime, as bridges spawn their
    /// session tasks immediately.
    pub fn new(connector: Arc<dyn Connector>, handlers: HandlerFactory, pane: Geometry) -> Self {
        let pane = if pane.is_valid() {
            pane
        } else {
            Geometry::default()
        };
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();

        let mut multiplexer = Self {
            tabs: Vec::new(),
            active: SessionId::new(""),
            pane,
            connector,
            handlers,
            faults_tx,
            faults_rx,
        };
        multiplexer.add_tab(TabKind::InteractiveShell, INITIAL_TAB_LABEL);
        multiplexer
    }

    /// Append a tab and make it active
    ///
    /// Interactive tabs start connecting right away, sized to the current pane.
    pub fn add_tab(&mut self, kind: TabKind, label: impl Into<String>) -> &Tab {
        let id = SessionId::generate(kind.id_prefix());
        let label = label.into();

        let bridge = match kind {
            TabKind::InteractiveShell => {
                let handler = (self.handlers)(&id);
                Some(SessionBridge::open(
                    Arc::clone(&self.connector),
                    id.clone(),
                    self.pane,
                    handler,
                    self.faults_tx.clone(),
                ))
            }
            TabKind::AuxiliaryView => None,
        };

        tracing::info!(tab_id = %id, ?kind, %label, "tab added");
        self.active = id.clone();
        self.tabs.push(Tab {
            id,
            kind,
            label,
            bridge,
            fault: None,
        });

        let index = self.tabs.len() - 1;
        &self.tabs[index]
    }

    /// Close a tab and its session
    ///
    /// Unknown ids and the last remaining tab are left alone. Removing the
    /// active tab selects the first remaining one.
    pub fn remove_tab(&mut self, id: &SessionId) -> bool {
        if self.tabs.len() <= 1 {
            tracing::debug!(tab_id = %id, "refusing to remove the last tab");
            return false;
        }
        let Some(index) = self.position(id) else {
            return false;
        };

        let mut tab = self.tabs.remove(index);
        if let Some(bridge) = tab.bridge.as_mut() {
            bridge.close();
        }
        tracing::info!(tab_id = %id, "tab removed");

        if self.active == *id {
            let first = self.tabs[0].id.clone();
            self.activate(first);
        }
        true
    }

    /// Make `id` the active tab
    pub fn select_tab(&mut self, id: &SessionId) -> bool {
        if self.position(id).is_none() {
            return false;
        }
        self.activate(id.clone());
        true
    }

    /// Select the tab after the active one, wrapping around
    pub fn select_next(&mut self) -> bool {
        self.select_offset(1)
    }

    /// Select the tab before the active one, wrapping around
    pub fn select_previous(&mut self) -> bool {
        self.select_offset(self.tabs.len() - 1)
    }

    /// Select the tab at `index` in collection order
    pub fn select_index(&mut self, index: usize) -> bool {
        match self.tabs.get(index) {
            Some(tab) => {
                let id = tab.id.clone();
                self.activate(id);
                true
            }
            None => false,
        }
    }

    /// Record a new pane geometry and pass it to the active session
    ///
    /// Hidden tabs pick the geometry up when they are next selected.
    pub fn resize_pane(&mut self, rows: u16, cols: u16) -> bool {
        let Some(geometry) = Geometry::checked(rows, cols) else {
            return false;
        };
        if geometry == self.pane {
            return false;
        }
        self.pane = geometry;
        self.resize_active();
        true
    }

    /// Forward keystrokes to the active tab's session
    pub fn send_input(&self, bytes: &[u8]) -> bool {
        self.active_tab()
            .and_then(Tab::bridge)
            .map(|bridge| bridge.send_input(bytes))
            .unwrap_or(false)
    }

    /// Collect the faults bridges reported since the last call
    pub fn poll_faults(&mut self) -> Vec<SessionFault> {
        let mut faults = Vec::new();
        while let Ok(fault) = self.faults_rx.try_recv() {
            match self.tabs.iter_mut().find(|tab| tab.id == fault.session_id) {
                Some(tab) => tab.fault = Some(fault.kind.clone()),
                None => {
                    tracing::debug!(session_id = %fault.session_id, "fault for removed tab");
                }
            }
            faults.push(fault);
        }
        faults
    }

    /// Close every session; tabs stay in place
    pub fn shutdown(&mut self) {
        tracing::info!(tabs = self.tabs.len(), "closing all sessions");
        for bridge in self.tabs.iter_mut().filter_map(|tab| tab.bridge.as_mut()) {
            bridge.close();
        }
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn tab(&self, id: &SessionId) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == *id)
    }

    pub fn active_tab_id(&self) -> &SessionId {
        &self.active
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.tab(&self.active)
    }

    /// Index of the active tab in collection order
    pub fn active_index(&self) -> usize {
        self.position(&self.active).unwrap_or(0)
    }

    pub fn pane_geometry(&self) -> Geometry {
        self.pane
    }

    fn position(&self, id: &SessionId) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == *id)
    }

    fn select_offset(&mut self, offset: usize) -> bool {
        if self.tabs.len() < 2 {
            return false;
        }
        let index = (self.active_index() + offset) % self.tabs.len();
        self.select_index(index)
    }

    fn activate(&mut self, id: SessionId) {
        if self.active != id {
            tracing::debug!(tab_id = %id, "tab selected");
        }
        self.active = id;
        self.resize_active();
    }

    fn resize_active(&mut self) {
        let pane = self.pane;
        let active = self.active.clone();
        if let Some(bridge) = self
            .tabs
            .iter_mut()
            .find(|tab| tab.id == active)
            .and_then(|tab| tab.bridge.as_mut())
        {
            bridge.resize(pane.rows, pane.cols);
        }
    }
}

impl Drop for SessionMultiplexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
