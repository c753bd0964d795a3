//! camlink — run the camera bridge from the command line.
//!
//! Usage:
//!
//! ```text
//! camlink [config.json]
//! ```
//!
//! Loads a [`BridgeConfig`] from the given JSON file (defaults otherwise),
//! honours a `CAMLINK_URL` environment override for the endpoint, starts
//! the pipeline, and runs until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use camlink_bridge::{CameraBridge, FrameSink};
use camlink_core::BridgeConfig;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("CamLink v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            serde_json::from_str::<BridgeConfig>(&raw)
                .with_context(|| format!("parsing config file {path}"))?
        }
        None => BridgeConfig::default(),
    };
    if let Ok(url) = std::env::var("CAMLINK_URL") {
        config.endpoint = url;
    }
    config.validate()?;

    let bridge = CameraBridge::new(config);
    let sink: FrameSink = Arc::new(|origin, frame| {
        debug!("frame to host: {} ({} bytes)", origin, frame.len());
    });
    bridge.subscribe(sink);

    info!("{}", bridge.start().await);

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    info!("{}", bridge.stop().await);
    let status = bridge.status();
    info!(
        "session totals: captured={} admitted={} sent={} received={} transcode_failures={}",
        status.frames_captured,
        status.frames_admitted,
        status.frames_sent,
        status.frames_received,
        status.transcode_failures
    );

    Ok(())
}
