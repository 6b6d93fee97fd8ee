//! Event handling for the front-end
//!
//! Terminal input is read on a blocking thread and forwarded over a
//! channel, interleaved with periodic ticks used to poll session faults.

use std::time::Duration;

use crossterm::event::{self, Event};
use tokio::sync::mpsc;

/// Front-end events
#[derive(Debug)]
pub enum AppEvent {
    /// Terminal input event
    Input(Event),
    /// No input within the tick interval
    Tick,
}

/// Event source combining input polling with ticks
pub struct EventHandler {
    tx: mpsc::UnboundedSender<AppEvent>,
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tick_rate: Duration,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx, tick_rate }
    }

    /// Start polling for terminal events on a background thread
    ///
    /// The thread exits once the receiving side is gone.
    pub fn start_input_polling(&self) {
        let tx = self.tx.clone();
        let tick_rate = self.tick_rate;

        std::thread::spawn(move || loop {
            let event = match event::poll(tick_rate) {
                Ok(true) => match event::read() {
                    Ok(event) => AppEvent::Input(event),
                    Err(e) => {
                        tracing::error!("Error reading terminal event: {}", e);
                        break;
                    }
                },
                Ok(false) => AppEvent::Tick,
                Err(e) => {
                    tracing::error!("Error polling terminal events: {}", e);
                    break;
                }
            };
            if tx.send(event).is_err() {
                break;
            }
        });
    }

    /// Receive next event
    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}
