//! Per-connection bookkeeping held by the core.

use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tsirc_proto::{Message, Sid, Uid};

use super::registration::Registration;

/// Connection identifier: the process-wide connection serial. Doubles
/// as the UID serial when the connection registers as a user.
pub type ConnId = u64;

/// Outbound queue depth per connection.
pub const SEND_QUEUE_CAPACITY: usize = 4096;

/// What a connection currently is.
#[derive(Debug)]
pub enum Role {
    /// Still registering. Holds the registration progress.
    Pre(Registration),
    /// A registered local user.
    User(Uid),
    /// An established server link.
    Server(Sid),
}

/// A live local connection.
#[derive(Debug)]
pub struct Conn {
    pub id: ConnId,
    pub addr: SocketAddr,
    tx: mpsc::Sender<Message>,
    /// Set when the send queue overflowed. Once set, nothing further is
    /// queued and the core drops the connection on its next sweep.
    pub send_queue_exceeded: bool,
    pub role: Role,
}

impl Conn {
    pub fn new(id: ConnId, addr: SocketAddr, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            addr,
            tx,
            send_queue_exceeded: false,
            role: Role::Pre(Registration::Start),
        }
    }

    /// Queue a message for the writer task without blocking the core.
    /// A full or closed queue marks the connection for teardown.
    pub fn queue(&mut self, message: Message) {
        if self.send_queue_exceeded {
            return;
        }
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.send_queue_exceeded = true;
            }
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self.role, Role::Server(_))
    }
}
