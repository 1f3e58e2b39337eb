//! tsircd: a small IRC daemon that links to peers over TS6.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod handlers;
mod network;
mod state;
mod sync;

use config::Config;
use network::gateway::Gateway;
use state::Core;

/// Version string sent in numerics and shown to peers.
pub(crate) const VERSION: &str = concat!("tsircd-", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tsircd.toml".to_string());
    let config = Config::load(&path).with_context(|| format!("loading {}", path))?;
    info!(
        server = %config.server.name,
        sid = %config.server.sid,
        version = VERSION,
        "starting"
    );

    let (core, events) = Core::new(config.clone())?;
    tokio::spawn(core.run());

    // One serial counter for every connection, however it arrives.
    let serials = Arc::new(AtomicU64::new(0));
    sync::manager::connect_links(&config, events.clone(), serials.clone());

    let gateway = Gateway::bind(&config, events, serials).await?;
    gateway.run().await
}
