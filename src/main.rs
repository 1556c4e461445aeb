//! Frogger Server
//!
//! Loads the configuration and level grids, opens the visualization
//! endpoint and runs the simulation for the configured number of ticks.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use frogger::{
    VERSION,
    config::SimulationConfig,
    game::layout::LayoutStore,
    network::{ClientBridge, Simulation},
};

#[derive(Parser, Debug)]
#[command(name = "frogger-server", version, about = "Client-paced Frogger simulation")]
struct Cli {
    /// Path to the JSON configuration.
    #[arg(long, env = "FROGGER_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Run without a client, overriding the config.
    #[arg(long)]
    headless: bool,

    /// Override the iteration count.
    #[arg(long)]
    iterations: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Frogger Server v{}", VERSION);

    let mut config = SimulationConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if cli.headless {
        config.visualization = false;
    }
    if let Some(iterations) = cli.iterations {
        config.iterations = iterations;
    }

    let layouts = Arc::new(LayoutStore::load(&config.level_files).context("loading level grids")?);
    info!("Loaded {} level(s)", layouts.len());

    let bridge = Arc::new(ClientBridge::new(config.session_defaults(), config.admission()));
    let server = if config.visualization {
        let listener = tokio::net::TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("binding {}", config.bind_addr))?;
        info!("Visualization on ws://{}", config.bind_addr);
        Some(tokio::spawn(bridge.clone().run(listener)))
    } else {
        None
    };

    {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                bridge.shutdown().await;
            }
        });
    }

    let mut simulation = Simulation::from_config(&config, layouts, bridge.clone());
    let summary = simulation.run(config.iterations).await;

    bridge.shutdown().await;
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Visualization endpoint failed: {}", e),
            Err(e) => error!("Visualization task panicked: {}", e),
        }
    }

    println!("{}", summary);
    Ok(())
}
