//! Socket handling: the listener and per-connection reader/writer
//! tasks.

pub mod connection;
pub mod gateway;
