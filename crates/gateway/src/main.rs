use anyhow::Context;
use clap::Parser;
use syncgate_gateway::{logging, ApiState, GatewayConfig};
use tokio::net::TcpListener;

#[derive(Debug, Parser)]
#[command(name = "syncgate-gateway", version, about = "Session refresh and mutation authorization gateway")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen address (e.g. 0.0.0.0:8080)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = GatewayConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    logging::setup_logging(&config.logging)?;
    logging::log_welcome("syncgate-gateway", env!("CARGO_PKG_VERSION"));

    let state = ApiState::from_config(&config)?;
    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("binding {}", config.server.bind_address))?;

    syncgate_gateway::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;

    Ok(())
}
