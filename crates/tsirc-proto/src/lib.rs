//! RFC 1459 message framing and TS6 identifier types.
//!
//! This crate contains the wire-level pieces of tsircd: the [`Message`]
//! type with its lenient parser and truncating encoder, a [`LineCodec`]
//! for use with `tokio_util::codec`, and the [`Sid`]/[`Uid`] identifier
//! types used by the TS6 server-to-server protocol.
//!
//! The parser is deliberately more forgiving than RFC 2812 requires.
//! Plenty of widely deployed clients and servers emit lines with
//! trailing whitespace or a ':' inside a middle parameter, and we would
//! rather interoperate than disconnect them.

pub mod casemap;
pub mod error;
pub mod id;
pub mod line;
pub mod message;
mod parse;
pub mod valid;

pub use casemap::to_canonical;
pub use error::{EncodeError, MessageParseError, ProtocolError};
pub use id::{IdError, Sid, Uid, UID_SERIAL_SPACE};
pub use line::LineCodec;
pub use message::{Message, MAX_LINE_LEN, MAX_PARAMS};
