//! Error types for termbridge
//!
//! Provides a unified error type used across all termbridge crates.

use std::path::PathBuf;

/// Main error type for termbridge operations
#[derive(Debug, thiserror::Error)]
pub enum TermbridgeError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Invalid host URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Unknown remote: {0}")]
    UnknownRemote(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TermbridgeError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using TermbridgeError
pub type Result<T> = std::result::Result<T, TermbridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TermbridgeError::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
        let err = TermbridgeError::UnknownRemote("staging".into());
        assert_eq!(err.to_string(), "Unknown remote: staging");
    }

    #[test]
    fn test_invalid_url_display() {
        let err = TermbridgeError::InvalidUrl {
            url: "nope".into(),
            message: "relative URL without a base".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid host URL 'nope': relative URL without a base"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: TermbridgeError = io_err.into();
        assert!(matches!(err, TermbridgeError::Io(_)));
    }
}
