//! Outbound link dialing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::network::connection;
use crate::state::Event;

/// Dial every autoconnect link once at startup. Failures are logged
/// and left to the operator; there is no reconnect loop.
pub fn connect_links(config: &Config, events: mpsc::Sender<Event>, serials: Arc<AtomicU64>) {
    let dead_time = Duration::from_secs(config.server.dead_time_secs);
    for link in config.links.iter().filter(|l| l.autoconnect).cloned() {
        let events = events.clone();
        let serials = serials.clone();
        tokio::spawn(async move {
            let target = format!("{}:{}", link.hostname, link.port);
            let stream = match TcpStream::connect(&target).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(link = %link.name, %target, error = %e, "unable to connect");
                    return;
                }
            };
            let addr = match stream.peer_addr() {
                Ok(addr) => addr,
                Err(e) => {
                    warn!(link = %link.name, error = %e, "unable to resolve peer address");
                    return;
                }
            };
            let id = serials.fetch_add(1, Ordering::SeqCst);
            info!(conn = id, link = %link.name, %addr, "dialed link");
            connection::spawn(id, stream, addr, events, dead_time, Some(link)).await;
        });
    }
}
