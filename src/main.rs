use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use tracing_subscriber::EnvFilter;

use gpudash::config::{self, Config};
use gpudash::server::{self, AppState};

#[derive(Parser)]
#[command(
    name = "gpudash",
    about = "Telemetry server streaming host and GPU metrics over WebSocket"
)]
struct Cli {
    /// TCP port to listen on
    port: Option<u16>,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Default tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gpudash=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli);

    let addr: SocketAddr = format!(
        "{}:{}",
        config.server.bind_address, config.server.port
    )
    .parse()
    .map_err(|e| eyre!("invalid bind address: {e}"))?;

    let state = Arc::new(AppState::new(config));
    server::run(state, addr).await?;
    Ok(())
}

fn load_config_for_cli(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => config::load_config_from_path(path),
        None => config::load_config(),
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref bind) = cli.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(tick_ms) = cli.tick_ms {
        config.sampling.tick_ms = tick_ms;
    }

    config
}
