//! Terminal size observation
//!
//! Turns raw size reports from the local terminal into the geometry changes
//! worth passing on: zero-sized reports are dropped and repeats are
//! collapsed, but nothing is time-debounced.

use termbridge_protocol::Geometry;

/// Tracks the last reported terminal size
#[derive(Debug, Default)]
pub struct ResizeObserver {
    previous: Option<Geometry>,
}

impl ResizeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known size, so reporting it again yields nothing
    pub fn with_initial(geometry: Geometry) -> Self {
        Self {
            previous: geometry.is_valid().then_some(geometry),
        }
    }

    /// Record a size report in crossterm's `(cols, rows)` order
    ///
    /// Returns the new geometry only when it is valid and differs from the
    /// last accepted one.
    pub fn observe(&mut self, cols: u16, rows: u16) -> Option<Geometry> {
        let geometry = Geometry::checked(rows, cols)?;
        if self.previous == Some(geometry) {
            return None;
        }
        self.previous = Some(geometry);
        Some(geometry)
    }

    pub fn previous(&self) -> Option<Geometry> {
        self.previous
    }
}

/// Current size of the local terminal, or `fallback` when it can't be read
pub fn terminal_geometry(fallback: Geometry) -> Geometry {
    match crossterm::terminal::size() {
        Ok((cols, rows)) => Geometry::checked(rows, cols).unwrap_or(fallback),
        Err(e) => {
            tracing::debug!("terminal size unavailable, using {}: {}", fallback, e);
            fallback
        }
    }
}
