//! In-process transport
//!
//! Connects sessions to a [`MemoryListener`] over channels instead of a
//! socket. Each accepted [`MemoryPeer`] plays the PTY host for one session.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, Semaphore};

use termbridge_protocol::{ClientFrame, HostMessage, SessionId};
use termbridge_utils::{Result, TermbridgeError};

use super::{Connector, TransportHandle};

/// Connector whose connections terminate in the same process
#[derive(Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refused: Arc<Mutex<HashSet<SessionId>>>,
    /// When set, each establishment waits for a permit
    gate: Option<Arc<Semaphore>>,
}

/// Accepting side of a [`MemoryConnector`]
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Host end of one in-process session
pub struct MemoryPeer {
    session_id: SessionId,
    frames: mpsc::UnboundedReceiver<ClientFrame>,
    output: mpsc::UnboundedSender<Result<HostMessage>>,
}

impl MemoryConnector {
    /// Create a connector that establishes connections immediately
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers: tx,
            refused: Arc::new(Mutex::new(HashSet::new())),
            gate: None,
        };
        (connector, MemoryListener { peers: rx })
    }

    /// Create a connector whose establishments stay pending until
    /// [`release`](Self::release) hands out permits
    pub fn gated() -> (Self, MemoryListener) {
        let (mut connector, listener) = Self::new();
        connector.gate = Some(Arc::new(Semaphore::new(0)));
        (connector, listener)
    }

    /// Let `count` pending or future establishments proceed
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Make establishment fail for `session_id`
    pub fn refuse(&self, session_id: impl Into<SessionId>) {
        self.refused
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.into());
    }

    fn is_refused(&self, session_id: &SessionId) -> bool {
        self.refused
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(session_id)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, session_id: &SessionId) -> BoxFuture<'static, Result<TransportHandle>> {
        let connector = self.clone();
        let session_id = session_id.clone();

        Box::pin(async move {
            if let Some(gate) = &connector.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|_| TermbridgeError::connection("connector shut down"))?;
                permit.forget();
            }

            if connector.is_refused(&session_id) {
                return Err(TermbridgeError::connection(format!(
                    "connection refused for {}",
                    session_id
                )));
            }

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();

            let peer = MemoryPeer {
                session_id: session_id.clone(),
                frames: out_rx,
                output: in_tx,
            };
            connector
                .peers
                .send(peer)
                .map_err(|_| TermbridgeError::connection("listener dropped"))?;

            tracing::debug!(%session_id, "memory transport established");
            Ok(TransportHandle::new(out_tx, in_rx))
        })
    }
}

impl MemoryListener {
    /// Wait for the next established session
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Take an already established session, if any
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

impl MemoryPeer {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Next frame sent by the client; `None` once the client closed
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        self.frames.recv().await
    }

    /// Frame already queued by the client, if any
    pub fn try_next_frame(&mut self) -> Option<ClientFrame> {
        self.frames.try_recv().ok()
    }

    /// Push terminal output to the client
    pub fn send_output(&self, bytes: &[u8]) -> bool {
        self.output
            .send(Ok(HostMessage::Output(Bytes::copy_from_slice(bytes))))
            .is_ok()
    }

    /// Close the session from the host side
    pub fn close(self) {
        let _ = self.output.send(Ok(HostMessage::Closed { reason: None }));
    }

    /// Report a transport fault to the client
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self
            .output
            .send(Err(TermbridgeError::connection(message.into())));
    }
}
