//! The IRC message type and its wire encoder.

use std::fmt;
use std::str::FromStr;

use crate::error::{EncodeError, MessageParseError};
use crate::parse;

/// Maximum length of a wire line in bytes, including the "\r\n".
pub const MAX_LINE_LEN: usize = 512;

/// Maximum number of parameters a message may carry.
pub const MAX_PARAMS: usize = 15;

/// A single IRC protocol message.
///
/// `command` is always stored uppercased. `params` holds the decoded
/// parameters with any leading ':' on the trailing parameter removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    /// Build a message with no prefix.
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Build a message with a source prefix.
    pub fn with_prefix(
        prefix: impl Into<String>,
        command: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        Self {
            prefix: Some(prefix.into()),
            command: command.into(),
            params,
        }
    }

    /// Encode the message as a wire line terminated by "\r\n".
    ///
    /// A parameter is rendered with a ':' sigil when it is empty,
    /// contains a space, or contains a ':'. Only the last parameter may
    /// need one; anywhere else is [`EncodeError::NonTrailingSpace`].
    ///
    /// If the full rendering would exceed [`MAX_LINE_LEN`] the line is
    /// cut at a character boundary and returned inside
    /// [`EncodeError::Truncated`] so the caller can still send it.
    pub fn encode(&self) -> Result<String, EncodeError> {
        let mut line = String::with_capacity(64);
        if let Some(prefix) = &self.prefix {
            line.push(':');
            line.push_str(prefix);
            line.push(' ');
        }
        line.push_str(&self.command);
        if line.len() + 2 > MAX_LINE_LEN {
            return Err(EncodeError::HeadTooLong);
        }

        let mut truncated = false;
        for (i, param) in self.params.iter().enumerate() {
            let last = i + 1 == self.params.len();
            let sigil = param.is_empty() || param.contains(' ') || param.contains(':');
            if sigil && !last {
                return Err(EncodeError::NonTrailingSpace);
            }

            // Space separator plus the terminator must still fit.
            let room = MAX_LINE_LEN - 2 - line.len();
            let rendered_len = param.len() + if sigil { 1 } else { 0 };
            if rendered_len + 1 > room {
                if room > 1 {
                    line.push(' ');
                    if sigil {
                        line.push(':');
                    }
                    let mut cut = (room - 1 - if sigil { 1 } else { 0 }).min(param.len());
                    while !param.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    line.push_str(&param[..cut]);
                }
                truncated = true;
                break;
            }

            line.push(' ');
            if sigil {
                line.push(':');
            }
            line.push_str(param);
        }

        line.push_str("\r\n");
        if truncated {
            return Err(EncodeError::Truncated { line });
        }
        Ok(line)
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::message(s)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        write!(f, "{}", self.command)?;
        for param in &self.params {
            write!(f, " {}", param)?;
        }
        Ok(())
    }
}
