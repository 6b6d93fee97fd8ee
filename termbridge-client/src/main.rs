//! termbridge - multi-tab terminal client
//!
//! Opens one WebSocket session per tab against a remote PTY host and shows
//! the active tab on the local terminal.

use std::sync::Arc;

use termbridge_client::config::ClientConfig;
use termbridge_client::input::{parse_prefix, InputHandler};
use termbridge_client::WebSocketConnector;
use termbridge_utils::{init_logging_with_config, LogConfig, Result};

mod app;
mod cli;
mod event;
mod terminal;

use app::App;
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    // Log to a file, the terminal is in raw mode
    let mut log_config = LogConfig::client();
    if let Some(filter) = &args.log {
        log_config = log_config.with_filter(filter.clone());
    }
    init_logging_with_config(log_config)?;
    tracing::info!("termbridge client starting");
    tracing::debug!("CLI args: {:?}", args);

    match run_app(args).await {
        Ok(()) => {
            tracing::info!("termbridge client exiting normally");
            Ok(())
        }
        Err(e) => {
            tracing::error!("termbridge client error: {}", e);
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}

async fn run_app(args: Args) -> Result<()> {
    let config = ClientConfig::load();

    let url = args.host_url(&config)?;
    let path = args.terminal_path(&config);
    let connector = WebSocketConnector::new(&url, &path)?;
    tracing::info!(%url, %path, "using terminal host");

    let prefix = match parse_prefix(&config.keybindings.prefix) {
        Ok(prefix) => Some(prefix),
        Err(e) => {
            tracing::warn!("{}, using Ctrl-b", e);
            None
        }
    };
    let input = match prefix {
        Some(prefix) => InputHandler::with_prefix(prefix),
        None => InputHandler::new(),
    };

    let mut app = App::new(Arc::new(connector), input, config.terminal.geometry());
    app.run().await
}
