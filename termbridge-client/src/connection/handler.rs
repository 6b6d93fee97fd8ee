//! Session event handler trait and utilities

use crate::bridge::FaultKind;

/// Receives everything a session produces for its tab
///
/// One handler belongs to exactly one bridge and is driven from that
/// bridge's session task, so calls for a session arrive in order.
pub trait SessionHandler: Send {
    /// Output bytes from the host, in arrival order
    fn on_output(&mut self, bytes: &[u8]);

    /// Called once the geometry handshake completed and input is accepted
    fn on_opened(&mut self) {}

    /// Called when the session ended normally
    fn on_closed(&mut self) {}

    /// Called when the session failed
    fn on_failed(&mut self, _fault: &FaultKind) {}
}

/// Simple callback-based handler that only cares about output
pub struct CallbackHandler<F>
where
    F: FnMut(&[u8]) + Send,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: FnMut(&[u8]) + Send,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> SessionHandler for CallbackHandler<F>
where
    F: FnMut(&[u8]) + Send,
{
    fn on_output(&mut self, bytes: &[u8]) {
        (self.callback)(bytes);
    }
}
