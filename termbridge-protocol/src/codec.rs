//! JSON framing for client frames

use crate::messages::ClientFrame;

/// Maximum encoded frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid geometry: {rows}x{cols}")]
    InvalidGeometry { rows: u16, cols: u16 },
}

/// Encode a frame as the JSON text sent over the transport
pub fn encode_frame(frame: &ClientFrame) -> Result<String, CodecError> {
    if let Some(geometry) = frame.geometry() {
        if !geometry.is_valid() {
            return Err(CodecError::InvalidGeometry {
                rows: geometry.rows,
                cols: geometry.cols,
            });
        }
    }

    let text = serde_json::to_string(frame)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    Ok(text)
}

/// Decode a frame as received by a host
pub fn decode_frame(text: &str) -> Result<ClientFrame, CodecError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let frame: ClientFrame = serde_json::from_str(text)?;
    if let Some(geometry) = frame.geometry() {
        if !geometry.is_valid() {
            return Err(CodecError::InvalidGeometry {
                rows: geometry.rows,
                cols: geometry.cols,
            });
        }
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Geometry;

    #[test]
    fn test_encode_resize() {
        let text = encode_frame(&ClientFrame::resize(Geometry::new(24, 80))).unwrap();
        assert_eq!(text, r#"{"type":"resize","rows":24,"cols":80}"#);
    }

    #[test]
    fn test_encode_rejects_zero_geometry() {
        let result = encode_frame(&ClientFrame::Resize { rows: 0, cols: 80 });
        assert!(matches!(
            result,
            Err(CodecError::InvalidGeometry { rows: 0, cols: 80 })
        ));
    }

    #[test]
    fn test_decode_input() {
        let frame = decode_frame(r#"{"type":"input","data":"ls\n"}"#).unwrap();
        assert_eq!(frame, ClientFrame::input(b"ls\n"));
    }

    #[test]
    fn test_decode_unknown_type() {
        let result = decode_frame(r#"{"type":"paste","data":"x"}"#);
        assert!(matches!(result, Err(CodecError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_zero_geometry() {
        let result = decode_frame(r#"{"type":"resize","rows":24,"cols":0}"#);
        assert!(matches!(result, Err(CodecError::InvalidGeometry { .. })));
    }

    #[test]
    fn test_encode_too_large() {
        let frame = ClientFrame::Input {
            data: "x".repeat(MAX_FRAME_SIZE),
        };
        assert!(matches!(
            encode_frame(&frame),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }
}
