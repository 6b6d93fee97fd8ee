//! termbridge-client: Session-multiplexing terminal bridge
//!
//! Keeps one transport connection per terminal tab against a remote PTY
//! host. A [`SessionMultiplexer`] owns the tabs; each interactive tab drives
//! its own [`SessionBridge`], which synchronizes geometry, forwards input
//! and delivers output to the tab's [`SessionHandler`].

pub mod bridge;
pub mod config;
pub mod connection;
pub mod display;
pub mod input;
pub mod multiplexer;
pub mod resize;

pub use bridge::{ConnectionState, FaultKind, SessionBridge, SessionFault};
pub use config::ClientConfig;
pub use connection::{
    CallbackHandler, Connector, MemoryConnector, SessionHandler, TransportHandle,
    WebSocketConnector,
};
pub use display::TerminalDisplay;
pub use multiplexer::{HandlerFactory, SessionMultiplexer, Tab, TabKind};
