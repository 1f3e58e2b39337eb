//! Server state, owned exclusively by the core event loop.

pub(crate) mod actor;
mod channel;
mod conn;
mod registration;
mod server;
mod user;

pub use actor::{Core, Event};
pub use channel::Channel;
pub use conn::{Conn, ConnId, Role, SEND_QUEUE_CAPACITY};
pub use registration::{PreUser, Registration};
pub use server::{LinkStatus, Server};
pub use user::User;
