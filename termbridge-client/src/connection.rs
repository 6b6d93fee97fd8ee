//! Per-session transport connections
//!
//! Every terminal session owns exactly one transport connection. A
//! [`Connector`] establishes it; the resulting [`TransportHandle`] carries
//! frames out and host messages in over a pair of channels serviced by a
//! background connection task.

mod handler;
mod memory;
mod websocket;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use termbridge_protocol::{ClientFrame, HostMessage, SessionId};
use termbridge_utils::{Result, TermbridgeError};

pub use handler::{CallbackHandler, SessionHandler};
pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
pub use websocket::WebSocketConnector;

/// Establishes transport connections addressed by session id
pub trait Connector: Send + Sync + 'static {
    /// Open a connection for `session_id`
    ///
    /// The returned future resolves once the connection is usable, or with
    /// the establishment error.
    fn connect(&self, session_id: &SessionId) -> BoxFuture<'static, Result<TransportHandle>>;
}

/// Exclusive handle on one session's transport connection
pub struct TransportHandle {
    /// Channel for outgoing frames; `None` once closed
    outgoing: Option<mpsc::UnboundedSender<ClientFrame>>,
    /// Channel for messages from the host
    incoming: mpsc::UnboundedReceiver<Result<HostMessage>>,
}

impl TransportHandle {
    pub fn new(
        outgoing: mpsc::UnboundedSender<ClientFrame>,
        incoming: mpsc::UnboundedReceiver<Result<HostMessage>>,
    ) -> Self {
        Self {
            outgoing: Some(outgoing),
            incoming,
        }
    }

    /// Queue a frame for the host
    pub fn send(&self, frame: ClientFrame) -> Result<()> {
        let outgoing = self
            .outgoing
            .as_ref()
            .ok_or(TermbridgeError::ConnectionClosed)?;
        outgoing
            .send(frame)
            .map_err(|_| TermbridgeError::ConnectionClosed)
    }

    /// Receive the next host message
    ///
    /// `None` means the connection task has ended without a close reason.
    pub async fn recv(&mut self) -> Option<Result<HostMessage>> {
        self.incoming.recv().await
    }

    /// Close the connection
    ///
    /// Dropping the outgoing channel tells the connection task to shut the
    /// underlying stream down. Calling this more than once is harmless.
    pub fn close(&mut self) {
        if self.outgoing.take().is_some() {
            self.incoming.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outgoing.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_send_and_recv() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let mut handle = TransportHandle::new(out_tx, in_rx);

        handle.send(ClientFrame::input(b"ls\n")).unwrap();
        assert_eq!(out_rx.recv().await, Some(ClientFrame::input(b"ls\n")));

        in_tx
            .send(Ok(HostMessage::Output(Bytes::from_static(b"$ "))))
            .unwrap();
        let msg = handle.recv().await.unwrap().unwrap();
        assert_eq!(msg, HostMessage::Output(Bytes::from_static(b"$ ")));
    }

    #[tokio::test]
    async fn test_close_ends_outgoing_stream() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (_in_tx, in_rx) = mpsc::unbounded_channel();
        let mut handle = TransportHandle::new(out_tx, in_rx);

        handle.close();
        assert!(handle.is_closed());
        assert_eq!(out_rx.recv().await, None);

        // Second close is a no-op
        handle.close();
    }

    #[test]
    fn test_send_after_close_fails() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (_in_tx, in_rx) = mpsc::unbounded_channel();
        let mut handle = TransportHandle::new(out_tx, in_rx);

        handle.close();
        let result = handle.send(ClientFrame::input(b"x"));
        assert!(matches!(result, Err(TermbridgeError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_recv_none_when_task_gone() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let mut handle = TransportHandle::new(out_tx, in_rx);

        drop(in_tx);
        assert!(handle.recv().await.is_none());
    }
}
