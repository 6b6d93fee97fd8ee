//! Command-line argument parsing for the termbridge client
//!
//! Uses clap for argument parsing with derive macros.

use clap::Parser;

use termbridge_client::config::ClientConfig;
use termbridge_utils::Result;

/// termbridge - multi-tab terminal client for a remote PTY host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host base URL (ws://, wss://, http:// or https://)
    ///
    /// Overrides both --remote and the `host.url` config setting.
    /// Example: ws://localhost:3000
    #[arg(long, env = "TERMBRIDGE_URL")]
    pub url: Option<String>,

    /// Connect to a host alias from the `[remotes]` config table
    #[arg(long, short = 'r')]
    pub remote: Option<String>,

    /// Path prefix under which terminal sessions are served
    #[arg(long)]
    pub path: Option<String>,

    /// Log filter directive, e.g. `termbridge_client=debug`
    ///
    /// Takes precedence over the TERMBRIDGE_LOG environment variable.
    #[arg(long)]
    pub log: Option<String>,
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Host URL to connect to: `--url`, then `--remote`, then the config file
    pub fn host_url(&self, config: &ClientConfig) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        if let Some(remote) = &self.remote {
            return config.resolve_remote(remote).map(str::to_string);
        }
        Ok(config.host.url.clone())
    }

    /// Session path prefix: `--path`, then the config file
    pub fn terminal_path(&self, config: &ClientConfig) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| config.host.path.clone())
    }
}
