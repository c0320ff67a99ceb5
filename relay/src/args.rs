use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, ValueEnum};
use config::Config;
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "Relay", version, long_about = concat!("Relay v", env!("CARGO_PKG_VERSION"), ", a streaming chat proxy for LLM providers"))]
pub struct Args {
    /// IP address on which the server will listen for incoming connections.
    /// Default: 127.0.0.1:8000
    #[arg(short, long, env = "RELAY_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,
    /// Path to the TOML configuration file
    #[arg(long, short, env = "RELAY_CONFIG_PATH", default_value = "./relay.toml")]
    pub config: PathBuf,
    /// Log level of the relay crates (off, error, warn, info, debug, trace).
    /// Dependencies log warnings and errors only.
    #[arg(long = "log", env = "RELAY_LOG", default_value = "info")]
    pub log_level: LevelFilter,
    /// Style of log output. Colored on terminals, plain text otherwise.
    #[arg(long, env = "RELAY_LOG_STYLE")]
    pub log_style: Option<LogStyle>,
}

impl Args {
    /// Loads the configuration file, falling back to defaults when it does not exist.
    pub fn config(&self) -> anyhow::Result<Config> {
        let config = if self.config.exists() {
            Config::load(&self.config)?
        } else {
            Config::default()
        };

        Ok(config)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogStyle {
    Color,
    Text,
    Json,
}
