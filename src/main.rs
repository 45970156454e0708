//! HTTP/HTTPS forward proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────┐
//!                     │                 FORWARD PROXY                  │
//!   Client request    │  ┌──────────┐   ┌──────────┐   ┌────────────┐ │
//!   ──────────────────┼─▶│   net    │──▶│   http   │──▶│  dispatch  │ │
//!                     │  │ listener │   │  server  │   └─────┬──────┘ │
//!                     │  └──────────┘   └──────────┘         │        │
//!                     │                    CONNECT ┌──────────┴─────┐  │
//!                     │                  ┌─────────┘   other methods│  │
//!                     │                  ▼                          ▼  │
//!                     │          ┌──────────────┐        ┌──────────┐ │
//!                     │          │ dial + detach│        │ forward  │ │     Destination
//!                     │          │  → tunnel    │◀──────▶│  client  │◀┼──── servers
//!                     │          └──────────────┘        └──────────┘ │
//!                     └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use forward_proxy::config::{load_config, validate_config, ConfigError, ProxyConfig};
use forward_proxy::lifecycle::startup;
use forward_proxy::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "forward-proxy", version, about = "HTTP and HTTPS (CONNECT) forward proxy")]
struct Cli {
    /// Proxy port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Defaults, then the config file, then flags and environment.
    fn resolve_config(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(port) = self.port {
            config.listener.set_port(port);
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("forward-proxy: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        dial_timeout_secs = config.timeouts.dial_secs,
        read_timeout_secs = config.timeouts.read_secs,
        write_timeout_secs = config.timeouts.write_secs,
        "Running proxy"
    );

    if let Err(e) = startup::run(config).await {
        tracing::error!(error = %e, "Proxy terminated");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
