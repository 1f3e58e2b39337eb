//! Per-connection reader and writer tasks.
//!
//! The reader frames lines off the socket and forwards them to the
//! core as events. The writer drains the connection's bounded queue
//! back onto the socket. Neither touches server state; everything goes
//! through the core.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;
use tsirc_proto::{LineCodec, Message};

use crate::config::LinkBlock;
use crate::state::{ConnId, Event, SEND_QUEUE_CAPACITY};

/// Announce the connection to the core and start its reader and writer
/// tasks.
pub async fn spawn(
    id: ConnId,
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::Sender<Event>,
    dead_time: Duration,
    link: Option<LinkBlock>,
) {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
    if events
        .send(Event::Accepted {
            id,
            addr,
            tx,
            link,
        })
        .await
        .is_err()
    {
        return;
    }
    tokio::spawn(read_loop(id, read_half, events.clone(), dead_time));
    tokio::spawn(write_loop(id, write_half, rx, events));
}

async fn read_loop(
    id: ConnId,
    half: OwnedReadHalf,
    events: mpsc::Sender<Event>,
    dead_time: Duration,
) {
    let mut framed = FramedRead::new(half, LineCodec::new());
    let reason = loop {
        match timeout(dead_time, framed.next()).await {
            Err(_) => break "read timeout".to_string(),
            Ok(None) => break "connection closed".to_string(),
            Ok(Some(Err(e))) => break e.to_string(),
            Ok(Some(Ok(message))) => {
                if events.send(Event::Message { id, message }).await.is_err() {
                    return;
                }
            }
        }
    };
    debug!(conn = id, %reason, "reader finished");
    let _ = events.send(Event::Dead { id, reason }).await;
}

async fn write_loop(
    id: ConnId,
    half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Message>,
    events: mpsc::Sender<Event>,
) {
    let mut framed = FramedWrite::new(half, LineCodec::new());
    while let Some(message) = rx.recv().await {
        if let Err(e) = framed.send(message).await {
            debug!(conn = id, error = %e, "write failed");
            let _ = events
                .send(Event::Dead {
                    id,
                    reason: e.to_string(),
                })
                .await;
            return;
        }
    }
    // The core dropped its sender: queued lines are out, close cleanly.
    let _ = framed.into_inner().shutdown().await;
}
