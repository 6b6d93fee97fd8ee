//! Client-host message types

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::Geometry;

/// Envelope sent from the client to the PTY host
///
/// Serialized as a self-describing JSON object with a `type` discriminator:
/// `{"type":"input","data":"ls\n"}` or `{"type":"resize","rows":24,"cols":80}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Keystrokes for the remote shell
    Input { data: String },
    /// New terminal geometry
    Resize { rows: u16, cols: u16 },
}

impl ClientFrame {
    /// Build an input frame from raw keystroke bytes
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD, the same
    /// replacement the host applies when it decodes its own side. Use an
    /// [`InputDecoder`] when a character may be split across writes.
    pub fn input(bytes: &[u8]) -> Self {
        Self::Input {
            data: String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn resize(geometry: Geometry) -> Self {
        Self::Resize {
            rows: geometry.rows,
            cols: geometry.cols,
        }
    }

    /// Geometry carried by a resize frame
    pub fn geometry(&self) -> Option<Geometry> {
        match self {
            Self::Resize { rows, cols } => Some(Geometry::new(*rows, *cols)),
            Self::Input { .. } => None,
        }
    }

    /// Short name of the frame type, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input { .. } => "input",
            Self::Resize { .. } => "resize",
        }
    }
}

/// Turns a stream of keystroke bytes into input frames
///
/// A multibyte character split across writes is held back until the rest of
/// it arrives. Only bytes that can never become valid UTF-8 are replaced
/// with U+FFFD.
#[derive(Debug, Default)]
pub struct InputDecoder {
    pending: Vec<u8>,
}

impl InputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return the frame for everything decodable so far
    ///
    /// Returns `None` while the only bytes left are the start of an
    /// incomplete character.
    pub fn decode(&mut self, bytes: &[u8]) -> Option<ClientFrame> {
        self.pending.extend_from_slice(bytes);

        let mut data = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    data.push_str(valid);
                    rest = &[];
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    data.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            data.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Truncated sequence at the end: wait for more bytes
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();

        if data.is_empty() {
            None
        } else {
            Some(ClientFrame::Input { data })
        }
    }

    /// Bytes held back waiting for the rest of a character
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

/// Message received from the PTY host
///
/// Output is not wrapped in an envelope: whatever the host writes is terminal
/// output and is delivered as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    /// Raw terminal output
    Output(Bytes),
    /// The host closed the session
    Closed { reason: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_frame_json_shape() {
        let frame = ClientFrame::input(b"ls\n");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json, serde_json::json!({"type": "input", "data": "ls\n"}));
    }

    #[test]
    fn test_resize_frame_json_shape() {
        let frame = ClientFrame::resize(Geometry::new(30, 100));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "resize", "rows": 30, "cols": 100})
        );
    }

    #[test]
    fn test_input_replaces_invalid_utf8() {
        let frame = ClientFrame::input(&[b'a', 0xff, b'b']);
        assert_eq!(
            frame,
            ClientFrame::Input {
                data: "a\u{fffd}b".into()
            }
        );
    }

    #[test]
    fn test_control_bytes_pass_through() {
        // Up arrow followed by Ctrl-C
        let frame = ClientFrame::input(b"\x1b[A\x03");
        assert_eq!(
            frame,
            ClientFrame::Input {
                data: "\u{1b}[A\u{3}".into()
            }
        );
    }

    #[test]
    fn test_decoder_joins_split_character() {
        let euro = "€".as_bytes();
        let mut decoder = InputDecoder::new();

        assert_eq!(decoder.decode(&euro[..2]), None);
        assert_eq!(decoder.pending(), &euro[..2]);
        assert_eq!(
            decoder.decode(&euro[2..]),
            Some(ClientFrame::Input {
                data: "€".into()
            })
        );
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn test_decoder_flushes_complete_prefix() {
        let mut decoder = InputDecoder::new();
        let mut bytes = b"ab".to_vec();
        bytes.extend_from_slice(&"é".as_bytes()[..1]);

        assert_eq!(
            decoder.decode(&bytes),
            Some(ClientFrame::Input { data: "ab".into() })
        );
        assert_eq!(
            decoder.decode(&"é".as_bytes()[1..]),
            Some(ClientFrame::Input {
                data: "é".into()
            })
        );
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = InputDecoder::new();
        assert_eq!(
            decoder.decode(&[b'a', 0xff, b'b']),
            Some(ClientFrame::Input {
                data: "a\u{fffd}b".into()
            })
        );

        // A held-back lead byte followed by ASCII can never complete
        assert_eq!(decoder.decode(&[0xe2]), None);
        assert_eq!(
            decoder.decode(b"x"),
            Some(ClientFrame::Input {
                data: "\u{fffd}x".into()
            })
        );
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn test_frame_geometry() {
        assert_eq!(
            ClientFrame::resize(Geometry::new(24, 80)).geometry(),
            Some(Geometry::new(24, 80))
        );
        assert_eq!(ClientFrame::input(b"x").geometry(), None);
        assert_eq!(ClientFrame::input(b"x").kind(), "input");
    }
}
