//! Content-rewriting reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────┐
//!                        │                  REWRITE PROXY                    │
//!   GET /?url=<target>   │  ┌────────┐   ┌──────────┐   ┌─────────────────┐  │
//!   ─────────────────────┼─▶│  http  │──▶│ resolver │──▶│      fetch      │──┼──▶ Target
//!                        │  │ server │   │ validate │   │ direct/rendered │  │
//!                        │  └────────┘   └──────────┘   └────────┬────────┘  │
//!                        │                                       ▼           │
//!   rewritten body       │  ┌────────┐   ┌──────────┐   ┌─────────────────┐  │
//!   ◀────────────────────┼──│security│◀──│ rewrite  │◀──│   dispatcher    │  │
//!                        │  │headers │   │html/css/ │   │ (content kind)  │  │
//!                        │  └────────┘   │ js/json  │   └─────────────────┘  │
//!                        │               └──────────┘                        │
//!                        │  config · observability · lifecycle               │
//!                        └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use rewrite_proxy::config::{
    apply_env_overrides, load_config, validate_config, ConfigError, FetchStrategy, ProxyConfig,
};
use rewrite_proxy::lifecycle::startup;
use rewrite_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "rewrite-proxy")]
#[command(about = "Content-rewriting reverse proxy", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port (overrides config file and PORT).
    #[arg(short, long)]
    port: Option<u16>,

    /// Fetch strategy: direct or rendered.
    #[arg(short, long)]
    strategy: Option<FetchStrategy>,

    /// Write the default configuration to FILE and exit.
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,
}

fn resolve_config(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(strategy) = cli.strategy {
        config.fetch.strategy = strategy;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(path) = &cli.generate_config {
        let rendered = toml::to_string_pretty(&ProxyConfig::default())?;
        std::fs::write(path, rendered)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = resolve_config(&cli)?;
    logging::init_logging(&config.observability);

    tracing::info!("rewrite-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        strategy = %config.fetch.strategy,
        timeout_secs = config.fetch.timeout_secs,
        max_response_bytes = config.fetch.max_response_bytes,
        "Configuration loaded"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
