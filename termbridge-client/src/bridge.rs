//! Per-tab terminal session bridge
//!
//! A [`SessionBridge`] pumps bytes and geometry between one tab and the
//! transport connection of its session. The handle lives with the tab while
//! the I/O runs in a session task; the two share only the bridge's state
//! cell, whose transitions are checked so a terminal state is never left.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use termbridge_protocol::{ClientFrame, Geometry, HostMessage, InputDecoder, SessionId};
use termbridge_utils::Result;

use crate::connection::{Connector, SessionHandler, TransportHandle};

/// Lifecycle of a session bridge
///
/// `Closed` and `Failed` are terminal: a bridge in either state is never
/// reused, a new bridge is needed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Closed) | (Connecting, Failed) | (Open, Closed) | (Open, Failed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a session failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FaultKind {
    /// The transport could not be opened
    #[error("connection could not be established: {0}")]
    Establishment(String),

    /// The transport broke while the session was running
    #[error("transport fault: {0}")]
    Transport(String),
}

/// Failure notification for the owner of a bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFault {
    pub session_id: SessionId,
    pub kind: FaultKind,
}

/// State shared between a bridge handle and its session task
#[derive(Clone)]
struct StateCell(Arc<watch::Sender<ConnectionState>>);

impl StateCell {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Connecting);
        Self(Arc::new(tx))
    }

    fn get(&self) -> ConnectionState {
        *self.0.borrow()
    }

    /// Apply `next` if the state machine allows it; returns whether it did
    fn transition(&self, next: ConnectionState) -> bool {
        self.0.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.0.subscribe()
    }
}

/// Work queued by a bridge handle for its session task
#[derive(Debug)]
enum Command {
    Input(Vec<u8>),
    Resize(Geometry),
}

/// Client side of one terminal session
///
/// Created in `Connecting`; the session task moves it to `Open` once the
/// transport is up and the initial geometry has been sent. Dropping the
/// handle closes the session.
pub struct SessionBridge {
    session_id: SessionId,
    state: StateCell,
    /// Last geometry sent, or queued to be sent, to the host
    geometry: Geometry,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl SessionBridge {
    /// Start opening a session
    ///
    /// Establishment runs in a spawned task, so this must be called from
    /// within a Tokio runtime. Failures are reported through `handler` and
    /// `faults`, never returned.
    pub fn open(
        connector: Arc<dyn Connector>,
        session_id: SessionId,
        initial_geometry: Geometry,
        handler: Box<dyn SessionHandler>,
        faults: mpsc::UnboundedSender<SessionFault>,
    ) -> Self {
        let geometry = if initial_geometry.is_valid() {
            initial_geometry
        } else {
            tracing::warn!(
                %session_id,
                requested = %initial_geometry,
                "invalid initial geometry, using default"
            );
            Geometry::default()
        };

        let state = StateCell::new();
        let cancel = CancellationToken::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        tracing::debug!(%session_id, %geometry, "opening terminal session");
        let establish = connector.connect(&session_id);
        let task = SessionTask {
            session_id: session_id.clone(),
            state: state.clone(),
            cancel: cancel.clone(),
            commands: commands_rx,
            input: InputDecoder::new(),
            handler,
            faults,
        };
        tokio::spawn(task.run(establish, geometry));

        Self {
            session_id,
            state,
            geometry,
            commands: commands_tx,
            cancel,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Subscribe to state changes
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Wait until establishment finished one way or another
    pub async fn settled(&self) -> ConnectionState {
        self.wait_for(|state| state != ConnectionState::Connecting)
            .await
    }

    /// Wait until the session reached a terminal state
    pub async fn finished(&self) -> ConnectionState {
        self.wait_for(ConnectionState::is_terminal).await
    }

    async fn wait_for(&self, predicate: impl Fn(ConnectionState) -> bool) -> ConnectionState {
        let mut changes = self.state.subscribe();
        let state = match changes.wait_for(|state| predicate(*state)).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    /// Forward keystrokes to the host
    ///
    /// Only an open bridge forwards; anything else drops the bytes and
    /// returns `false`. Nothing is queued for a later connection. A character
    /// split across calls is sent once its last byte arrives.
    pub fn send_input(&self, bytes: &[u8]) -> bool {
        if bytes.is_empty() || self.state() != ConnectionState::Open {
            return false;
        }
        self.commands.send(Command::Input(bytes.to_vec())).is_ok()
    }

    /// Propagate a new geometry
    ///
    /// Sends a resize frame only when the geometry differs from the last one
    /// sent. Zero-sized geometries are ignored. While connecting, the change
    /// is queued behind the initial handshake so the host ends up at the
    /// latest size.
    pub fn resize(&mut self, rows: u16, cols: u16) -> bool {
        let Some(geometry) = Geometry::checked(rows, cols) else {
            tracing::trace!(session_id = %self.session_id, rows, cols, "ignoring empty geometry");
            return false;
        };

        if self.state().is_terminal() || geometry == self.geometry {
            return false;
        }

        if self.commands.send(Command::Resize(geometry)).is_err() {
            return false;
        }
        tracing::debug!(session_id = %self.session_id, %geometry, "terminal resized");
        self.geometry = geometry;
        true
    }

    /// Close the session and its transport
    ///
    /// Cancels a pending establishment. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state.transition(ConnectionState::Closed) {
            tracing::info!(session_id = %self.session_id, "terminal session closed");
        }
        self.cancel.cancel();
    }
}

impl Drop for SessionBridge {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for SessionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBridge")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .field("geometry", &self.geometry)
            .finish()
    }
}

/// I/O half of a bridge
struct SessionTask {
    session_id: SessionId,
    state: StateCell,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Carries incomplete UTF-8 sequences between input commands
    input: InputDecoder,
    handler: Box<dyn SessionHandler>,
    faults: mpsc::UnboundedSender<SessionFault>,
}

impl SessionTask {
    async fn run(
        mut self,
        establish: BoxFuture<'static, Result<TransportHandle>>,
        geometry: Geometry,
    ) {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(session_id = %self.session_id, "establishment canceled");
                return;
            }
            result = establish => result,
        };

        let mut transport = match result {
            Ok(transport) => transport,
            Err(e) => {
                self.fail(FaultKind::Establishment(e.to_string()));
                return;
            }
        };

        // The PTY must be sized before the shell prints its first prompt
        if let Err(e) = transport.send(ClientFrame::resize(geometry)) {
            self.fail(FaultKind::Establishment(e.to_string()));
            return;
        }

        if !self.state.transition(ConnectionState::Open) {
            // Closed while the connection was being established
            transport.close();
            return;
        }
        tracing::info!(session_id = %self.session_id, %geometry, "terminal session open");
        self.handler.on_opened();

        self.pump(&mut transport).await;
        transport.close();
    }

    async fn pump(&mut self, transport: &mut TransportHandle) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.handler.on_closed();
                    return;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        return;
                    };
                    let frame = match command {
                        Command::Input(bytes) => self.input.decode(&bytes),
                        Command::Resize(geometry) => Some(ClientFrame::resize(geometry)),
                    };
                    let Some(frame) = frame else {
                        continue;
                    };
                    tracing::trace!(session_id = %self.session_id, kind = frame.kind(), "sending frame");
                    if let Err(e) = transport.send(frame) {
                        self.fail(FaultKind::Transport(e.to_string()));
                        return;
                    }
                }
                message = transport.recv() => {
                    match message {
                        Some(Ok(HostMessage::Output(bytes))) => {
                            self.handler.on_output(&bytes);
                        }
                        Some(Ok(HostMessage::Closed { reason })) => {
                            self.remote_closed(reason.as_deref());
                            return;
                        }
                        Some(Err(e)) => {
                            self.fail(FaultKind::Transport(e.to_string()));
                            return;
                        }
                        None => {
                            self.remote_closed(None);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn remote_closed(&mut self, reason: Option<&str>) {
        if self.state.transition(ConnectionState::Closed) {
            tracing::info!(session_id = %self.session_id, ?reason, "host closed terminal session");
            self.handler.on_closed();
        }
    }

    fn fail(&mut self, kind: FaultKind) {
        // A bridge closed locally stays silent
        if !self.state.transition(ConnectionState::Failed) {
            return;
        }
        tracing::warn!(session_id = %self.session_id, "terminal session failed: {}", kind);
        self.handler.on_failed(&kind);
        let _ = self.faults.send(SessionFault {
            session_id: self.session_id.clone(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{MemoryConnector, MemoryListener, MemoryPeer};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Output(Vec<u8>),
        Opened,
        Closed,
        Failed(FaultKind),
    }

    struct Recorder(mpsc::UnboundedSender<Event>);

    impl SessionHandler for Recorder {
        fn on_output(&mut self, bytes: &[u8]) {
            let _ = self.0.send(Event::Output(bytes.to_vec()));
        }

        fn on_opened(&mut self) {
            let _ = self.0.send(Event::Opened);
        }

        fn on_closed(&mut self) {
            let _ = self.0.send(Event::Closed);
        }

        fn on_failed(&mut self, fault: &FaultKind) {
            let _ = self.0.send(Event::Failed(fault.clone()));
        }
    }

    struct Harness {
        bridge: SessionBridge,
        events: mpsc::UnboundedReceiver<Event>,
        faults: mpsc::UnboundedReceiver<SessionFault>,
    }

    fn open_bridge(connector: &MemoryConnector, id: &str, geometry: Geometry) -> Harness {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (fault_tx, faults) = mpsc::unbounded_channel();
        let bridge = SessionBridge::open(
            Arc::new(connector.clone()),
            SessionId::new(id),
            geometry,
            Box::new(Recorder(event_tx)),
            fault_tx,
        );
        Harness {
            bridge,
            events,
            faults,
        }
    }

    /// Open a bridge and wait until the handshake is done
    async fn open_ready(
        connector: &MemoryConnector,
        listener: &mut MemoryListener,
        id: &str,
    ) -> (Harness, MemoryPeer) {
        let mut harness = open_bridge(connector, id, Geometry::new(24, 80));
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(
            peer.next_frame().await,
            Some(ClientFrame::resize(Geometry::new(24, 80)))
        );
        assert_eq!(harness.bridge.settled().await, ConnectionState::Open);
        assert_eq!(harness.events.recv().await, Some(Event::Opened));
        (harness, peer)
    }

    #[test]
    fn test_state_machine_transitions() {
        use ConnectionState::*;
        assert!(Connecting.can_transition_to(Open));
        assert!(Connecting.can_transition_to(Failed));
        assert!(Connecting.can_transition_to(Closed));
        assert!(Open.can_transition_to(Closed));
        assert!(Open.can_transition_to(Failed));

        assert!(!Open.can_transition_to(Connecting));
        for terminal in [Closed, Failed] {
            assert!(terminal.is_terminal());
            for next in [Connecting, Open, Closed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_state_cell_never_leaves_terminal_state() {
        let cell = StateCell::new();
        assert!(cell.transition(ConnectionState::Failed));
        assert!(!cell.transition(ConnectionState::Open));
        assert!(!cell.transition(ConnectionState::Closed));
        assert_eq!(cell.get(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_open_sends_initial_geometry_first() {
        let (connector, mut listener) = MemoryConnector::new();
        let harness = open_bridge(&connector, "terminal-1", Geometry::new(40, 120));
        assert_eq!(harness.bridge.state(), ConnectionState::Connecting);

        let mut peer = listener.accept().await.unwrap();
        assert_eq!(peer.session_id().as_str(), "terminal-1");
        assert_eq!(
            peer.next_frame().await,
            Some(ClientFrame::Resize { rows: 40, cols: 120 })
        );
        assert_eq!(harness.bridge.settled().await, ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_input_dropped_while_connecting() {
        let (connector, mut listener) = MemoryConnector::gated();
        let mut harness = open_bridge(&connector, "terminal-1", Geometry::new(24, 80));

        assert!(!harness.bridge.send_input(b"early"));

        connector.release(1);
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(harness.bridge.settled().await, ConnectionState::Open);
        assert_eq!(harness.events.recv().await, Some(Event::Opened));

        assert!(harness.bridge.send_input(b"late"));
        assert_eq!(
            peer.next_frame().await,
            Some(ClientFrame::resize(Geometry::new(24, 80)))
        );
        assert_eq!(peer.next_frame().await, Some(ClientFrame::input(b"late")));
    }

    #[tokio::test]
    async fn test_input_preserves_call_order() {
        let (connector, mut listener) = MemoryConnector::new();
        let (harness, mut peer) = open_ready(&connector, &mut listener, "terminal-1").await;

        let chunks: [&[u8]; 4] = [b"l", b"s", b" -la", b"\n"];
        for chunk in chunks {
            assert!(harness.bridge.send_input(chunk));
        }

        let mut forwarded = String::new();
        while forwarded.len() < "ls -la\n".len() {
            match peer.next_frame().await {
                Some(ClientFrame::Input { data }) => forwarded.push_str(&data),
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        assert_eq!(forwarded, "ls -la\n");
    }

    #[tokio::test]
    async fn test_input_keeps_characters_split_across_calls() {
        let (connector, mut listener) = MemoryConnector::new();
        let (harness, mut peer) = open_ready(&connector, &mut listener, "terminal-1").await;

        let euro = "€".as_bytes();
        assert!(harness.bridge.send_input(&euro[..2]));
        assert!(harness.bridge.send_input(&euro[2..]));
        assert!(harness.bridge.send_input(&[0xff, b'!']));

        assert_eq!(
            peer.next_frame().await,
            Some(ClientFrame::Input {
                data: "€".to_string()
            })
        );
        assert_eq!(
            peer.next_frame().await,
            Some(ClientFrame::Input {
                data: "\u{fffd}!".to_string()
            })
        );
        assert!(peer.try_next_frame().is_none());
    }

    #[tokio::test]
    async fn test_resize_deduplicates() {
        let (connector, mut listener) = MemoryConnector::new();
        let (mut harness, mut peer) = open_ready(&connector, &mut listener, "terminal-1").await;

        assert!(!harness.bridge.resize(24, 80));
        assert!(!harness.bridge.resize(24, 80));
        assert!(harness.bridge.resize(30, 80));
        assert_eq!(harness.bridge.geometry(), Geometry::new(30, 80));

        // A marker input proves nothing else was queued in between
        assert!(harness.bridge.send_input(b"z"));
        assert_eq!(
            peer.next_frame().await,
            Some(ClientFrame::Resize { rows: 30, cols: 80 })
        );
        assert_eq!(peer.next_frame().await, Some(ClientFrame::input(b"z")));
    }

    #[tokio::test]
    async fn test_resize_ignores_empty_geometry() {
        let (connector, mut listener) = MemoryConnector::new();
        let (mut harness, mut peer) = open_ready(&connector, &mut listener, "terminal-1").await;

        assert!(!harness.bridge.resize(0, 80));
        assert!(!harness.bridge.resize(24, 0));
        assert_eq!(harness.bridge.geometry(), Geometry::new(24, 80));

        assert!(harness.bridge.send_input(b"z"));
        assert_eq!(peer.next_frame().await, Some(ClientFrame::input(b"z")));
    }

    #[tokio::test]
    async fn test_resize_while_connecting_follows_handshake() {
        let (connector, mut listener) = MemoryConnector::gated();
        let mut harness = open_bridge(&connector, "terminal-1", Geometry::new(24, 80));

        assert!(harness.bridge.resize(50, 160));
        connector.release(1);

        let mut peer = listener.accept().await.unwrap();
        assert_eq!(
            peer.next_frame().await,
            Some(ClientFrame::Resize { rows: 24, cols: 80 })
        );
        assert_eq!(
            peer.next_frame().await,
            Some(ClientFrame::Resize { rows: 50, cols: 160 })
        );
    }

    #[tokio::test]
    async fn test_output_delivered_in_order() {
        let (connector, mut listener) = MemoryConnector::new();
        let (mut harness, peer) = open_ready(&connector, &mut listener, "terminal-1").await;

        assert!(peer.send_output(b"a"));
        assert!(peer.send_output(b"b"));
        assert!(peer.send_output(b"c"));

        let mut received = Vec::new();
        while received.len() < 3 {
            match harness.events.recv().await {
                Some(Event::Output(bytes)) => received.extend(bytes),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(received, b"abc");
    }

    #[tokio::test]
    async fn test_output_passes_escape_sequences_untouched() {
        let (connector, mut listener) = MemoryConnector::new();
        let (mut harness, peer) = open_ready(&connector, &mut listener, "terminal-1").await;

        let colored = b"\x1b[32mok\x1b[0m\r\n";
        assert!(peer.send_output(colored));
        assert_eq!(
            harness.events.recv().await,
            Some(Event::Output(colored.to_vec()))
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (connector, mut listener) = MemoryConnector::new();
        let (mut harness, mut peer) = open_ready(&connector, &mut listener, "terminal-1").await;

        harness.bridge.close();
        assert_eq!(harness.bridge.state(), ConnectionState::Closed);
        harness.bridge.close();
        assert_eq!(harness.bridge.state(), ConnectionState::Closed);

        assert_eq!(harness.events.recv().await, Some(Event::Closed));
        // Transport torn down
        assert_eq!(peer.next_frame().await, None);

        assert!(!harness.bridge.send_input(b"x"));
        assert!(!harness.bridge.resize(30, 100));
    }

    #[tokio::test]
    async fn test_remote_close() {
        let (connector, mut listener) = MemoryConnector::new();
        let (mut harness, peer) = open_ready(&connector, &mut listener, "terminal-1").await;

        peer.close();
        assert_eq!(harness.bridge.finished().await, ConnectionState::Closed);
        assert_eq!(harness.events.recv().await, Some(Event::Closed));
        assert!(!harness.bridge.send_input(b"x"));
        assert!(harness.faults.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transport_fault_keeps_delivered_output() {
        let (connector, mut listener) = MemoryConnector::new();
        let (mut harness, peer) = open_ready(&connector, &mut listener, "terminal-1").await;

        assert!(peer.send_output(b"partial"));
        peer.fail("connection reset");

        assert_eq!(harness.bridge.finished().await, ConnectionState::Failed);
        assert_eq!(
            harness.events.recv().await,
            Some(Event::Output(b"partial".to_vec()))
        );
        assert!(matches!(
            harness.events.recv().await,
            Some(Event::Failed(FaultKind::Transport(_)))
        ));

        let fault = harness.faults.recv().await.unwrap();
        assert_eq!(fault.session_id.as_str(), "terminal-1");
        assert!(matches!(fault.kind, FaultKind::Transport(_)));

        assert!(!harness.bridge.send_input(b"x"));
        assert!(!harness.bridge.resize(30, 100));

        // Closing a failed bridge changes nothing
        harness.bridge.close();
        assert_eq!(harness.bridge.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_establishment_failure() {
        let (connector, _listener) = MemoryConnector::new();
        connector.refuse("terminal-bad");
        let mut harness = open_bridge(&connector, "terminal-bad", Geometry::new(24, 80));

        assert_eq!(harness.bridge.settled().await, ConnectionState::Failed);
        assert!(matches!(
            harness.events.recv().await,
            Some(Event::Failed(FaultKind::Establishment(_)))
        ));
        let fault = harness.faults.recv().await.unwrap();
        assert!(matches!(fault.kind, FaultKind::Establishment(_)));
    }

    #[tokio::test]
    async fn test_close_while_connecting_suppresses_completion() {
        let (connector, mut listener) = MemoryConnector::gated();
        let mut harness = open_bridge(&connector, "terminal-1", Geometry::new(24, 80));

        harness.bridge.close();
        assert_eq!(harness.bridge.state(), ConnectionState::Closed);

        connector.release(1);
        // The session task ends without reporting anything
        assert_eq!(harness.events.recv().await, None);
        assert!(harness.faults.try_recv().is_err());
        assert_eq!(harness.bridge.state(), ConnectionState::Closed);
        assert!(listener.try_accept().is_none());
    }

    #[tokio::test]
    async fn test_invalid_initial_geometry_falls_back() {
        let (connector, mut listener) = MemoryConnector::new();
        let harness = open_bridge(&connector, "terminal-1", Geometry::new(0, 0));
        assert_eq!(harness.bridge.geometry(), Geometry::default());

        let mut peer = listener.accept().await.unwrap();
        assert_eq!(
            peer.next_frame().await,
            Some(ClientFrame::resize(Geometry::default()))
        );
    }

    #[tokio::test]
    async fn test_drop_closes_transport() {
        let (connector, mut listener) = MemoryConnector::new();
        let (harness, mut peer) = open_ready(&connector, &mut listener, "terminal-1").await;

        drop(harness);
        assert_eq!(peer.next_frame().await, None);
    }
}
