//! Quickdraw Match Server
//!
//! Authoritative server binary: binds the WebSocket listener and runs the
//! accept loop until shutdown.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quickdraw::{MatchServer, ServerConfig, TICK_RATE, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("QUICKDRAW_ADDR") {
        config.bind_addr = addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid QUICKDRAW_ADDR: {addr}"))?;
    }

    info!("Quickdraw server v{}", VERSION);
    info!("Frame rate: {} Hz", TICK_RATE);

    let server = MatchServer::new(config);
    server.run().await.context("server terminated")?;
    Ok(())
}
