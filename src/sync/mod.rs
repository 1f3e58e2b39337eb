//! Server-to-server linking: the TS6 handshake, burst generation, and
//! outbound link dialing.

pub mod burst;
pub mod handshake;
pub mod manager;
