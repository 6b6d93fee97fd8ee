//! Value types shared by both ends of a terminal session

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a terminal session
///
/// Doubles as the routing key on the transport: the host keys its PTY
/// processes by this value, so two tabs must never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier of the form `<prefix>-<uuid>`
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}-{}", prefix, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Character-grid size of a terminal display
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub rows: u16,
    pub cols: u16,
}

impl Geometry {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Build a geometry, rejecting zero-sized dimensions
    pub fn checked(rows: u16, cols: u16) -> Option<Self> {
        let geometry = Self::new(rows, cols);
        geometry.is_valid().then_some(geometry)
    }

    /// A zero-sized pane is a transient layout state and must never reach the host
    pub fn is_valid(&self) -> bool {
        self.rows > 0 && self.cols > 0
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = SessionId::generate("terminal");
        let b = SessionId::generate("terminal");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("terminal-"));
    }

    #[test]
    fn test_session_id_serializes_as_plain_string() {
        let id = SessionId::new("primary-session");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"primary-session\"");
    }

    #[test]
    fn test_checked_geometry() {
        assert_eq!(Geometry::checked(24, 80), Some(Geometry::new(24, 80)));
        assert_eq!(Geometry::checked(0, 80), None);
        assert_eq!(Geometry::checked(24, 0), None);
    }

    #[test]
    fn test_default_geometry() {
        let geometry = Geometry::default();
        assert_eq!((geometry.rows, geometry.cols), (24, 80));
        assert_eq!(geometry.to_string(), "24x80");
    }
}
