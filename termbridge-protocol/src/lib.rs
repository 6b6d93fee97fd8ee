//! termbridge-protocol: Wire definitions shared with the remote PTY host
//!
//! This crate defines the frames a termbridge client exchanges with a
//! pseudo-terminal host over a per-session transport connection, plus the
//! small value types (session ids, geometry) both sides agree on.

pub mod codec;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{decode_frame, encode_frame, CodecError, MAX_FRAME_SIZE};
pub use messages::{ClientFrame, HostMessage, InputDecoder};
pub use types::{Geometry, SessionId};

/// Default path prefix under which the host serves terminal sessions.
///
/// The session id is appended as the final path segment.
pub const DEFAULT_TERMINAL_PATH: &str = "/ws/terminal";
