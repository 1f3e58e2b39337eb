//! Error types for message parsing, encoding, and framing.

use thiserror::Error;

/// Errors surfaced by [`crate::LineCodec`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line of {actual} bytes exceeds the {limit} byte limit")]
    LineTooLong { actual: usize, limit: usize },

    #[error("invalid message {string:?}: {cause}")]
    InvalidMessage {
        string: String,
        #[source]
        cause: MessageParseError,
    },

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Reasons a line can fail to parse as an IRC message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    #[error("empty message")]
    Empty,

    #[error("prefix with no command")]
    PrefixOnly,

    #[error("empty prefix")]
    EmptyPrefix,

    #[error("illegal byte in prefix")]
    InvalidPrefix,

    #[error("malformed command")]
    InvalidCommand,

    #[error("empty parameter outside the trailing position")]
    EmptyParam,

    #[error("illegal byte in parameter")]
    InvalidParam,
}

/// Errors from [`crate::Message::encode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The prefix and command alone do not fit within the line limit.
    #[error("prefix and command alone exceed the line limit")]
    HeadTooLong,

    /// A parameter other than the last one contains a space, a ':', or
    /// is empty. Such a parameter cannot be represented on the wire.
    #[error("space, ':', or empty string in a non-trailing parameter")]
    NonTrailingSpace,

    /// The encoded message had to be cut to fit the line limit. `line`
    /// holds the truncated, still well-formed line including "\r\n" so
    /// callers may send it anyway.
    #[error("message truncated to fit the line limit")]
    Truncated { line: String },
}
