//! Server records for the link map.

use tsirc_proto::Sid;

use super::conn::ConnId;

/// A server known to the network, direct or introduced over a link.
#[derive(Debug)]
pub struct Server {
    pub sid: Sid,
    pub name: String,
    pub description: String,
    /// Hops from us. 1 for direct peers.
    pub hopcount: u32,
    /// The direct link this server is reachable through. For a direct
    /// peer this is its own connection.
    pub link: ConnId,
    /// Present only on directly linked peers.
    pub status: Option<LinkStatus>,
}

/// Burst progress on a direct link.
#[derive(Debug)]
pub struct LinkStatus {
    /// Still exchanging the initial burst.
    pub bursting: bool,
    /// Saw the peer's burst-ending PING.
    pub got_ping: bool,
    /// Saw the peer's PONG to our burst-ending PING.
    pub got_pong: bool,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStatus {
    pub fn new() -> Self {
        Self {
            bursting: true,
            got_ping: false,
            got_pong: false,
        }
    }

    /// Both ends have seen each other's full burst.
    pub fn burst_complete(&self) -> bool {
        self.got_ping && self.got_pong
    }
}
