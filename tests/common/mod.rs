//! Integration test infrastructure: spawning daemons and driving raw
//! IRC client connections against them.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
