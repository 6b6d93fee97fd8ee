//! Client configuration loading
//!
//! Reads `config.toml` from the termbridge config directory. Every field has
//! a default, so a missing or partial file is fine; an unreadable one is
//! logged and ignored.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use termbridge_protocol::{Geometry, DEFAULT_TERMINAL_PATH};
use termbridge_utils::{config_file, Result, TermbridgeError};

/// Default host base URL
pub const DEFAULT_HOST_URL: &str = "ws://localhost:3000";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: HostConfig,
    pub terminal: TerminalConfig,
    pub keybindings: KeybindingConfig,
    /// Alias to host base URL
    pub remotes: HashMap<String, String>,
}

/// Where the PTY host listens
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Base URL, `ws(s)://` or `http(s)://`
    pub url: String,
    /// Path prefix under which session ids are appended
    pub path: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_HOST_URL.into(),
            path: DEFAULT_TERMINAL_PATH.into(),
        }
    }
}

/// Fallback geometry when the local terminal size can't be read
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub rows: u16,
    pub cols: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        let geometry = Geometry::default();
        Self {
            rows: geometry.rows,
            cols: geometry.cols,
        }
    }
}

impl TerminalConfig {
    pub fn geometry(&self) -> Geometry {
        Geometry::checked(self.rows, self.cols).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct KeybindingConfig {
    /// Prefix key for tab commands (default: Ctrl-b)
    pub prefix: String,
}

impl Default for KeybindingConfig {
    fn default() -> Self {
        Self {
            prefix: "Ctrl-b".into(),
        }
    }
}

impl ClientConfig {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let path = config_file();
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TermbridgeError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content).map_err(|e| match e {
            TermbridgeError::Config(message) => TermbridgeError::ConfigInvalid {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| TermbridgeError::config(e.to_string()))
    }

    /// Resolve a remote alias to a host URL
    pub fn resolve_remote(&self, name: &str) -> Result<&str> {
        self.remotes
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| TermbridgeError::UnknownRemote(name.to_string()))
    }
}
