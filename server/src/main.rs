//! main.rs — server entry point.
//!
//! Loads the config and landscape, starts the server tasks, and runs until
//! ctrl-c. Startup failures (bad config, unloadable landscape, bind error)
//! exit non-zero; a signal-driven stop exits zero after broadcasting bye to
//! every connected session.

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ironclad_server::config;
use ironclad_server::landscape::Landscape;
use ironclad_server::server::Server;

#[derive(Parser, Debug)]
#[command(name = "ironclad-server", about = "Authoritative multi-tank combat server")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,
    /// Override the landscape file path
    #[arg(long)]
    landscape: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ironclad_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut cfg = config::load(&args.config)?;
    if let Some(port) = args.port {
        cfg.server.port = port;
    }
    if let Some(path) = args.landscape {
        cfg.world.landscape = path;
    }

    let landscape = Landscape::from_file(
        &cfg.world.landscape,
        cfg.world.tile_size,
        cfg.world.height_scale,
    )?;
    info!(
        "🗺  landscape {0}x{0} nodes, tile {1}, extent {2}",
        landscape.size(),
        landscape.tile_size(),
        landscape.extent(),
    );

    let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cfg.server.port));
    let server = Server::spawn(bind, cfg.game, landscape).await?;
    info!("🛡  ironclad up on udp {}", server.addr());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("stopping");
    server.shutdown().await;
    Ok(())
}
