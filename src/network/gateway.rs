//! The accept loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::Config;
use crate::network::connection;
use crate::state::Event;

pub struct Gateway {
    listener: TcpListener,
    events: mpsc::Sender<Event>,
    /// Shared with the link dialer so every connection, inbound or
    /// outbound, gets a distinct serial.
    serials: Arc<AtomicU64>,
    dead_time: Duration,
}

impl Gateway {
    pub async fn bind(
        config: &Config,
        events: mpsc::Sender<Event>,
        serials: Arc<AtomicU64>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.listen.address).await?;
        info!(address = %config.listen.address, "listening");
        Ok(Self {
            listener,
            events,
            serials,
            dead_time: Duration::from_secs(config.server.dead_time_secs),
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let id = self.serials.fetch_add(1, Ordering::SeqCst);
                    info!(conn = id, %addr, "connection accepted");
                    connection::spawn(id, stream, addr, self.events.clone(), self.dead_time, None)
                        .await;
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}
