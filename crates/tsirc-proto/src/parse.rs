//! Lenient RFC 1459 line parser.
//!
//! Divergences from the grammar, all in the direction of accepting
//! real-world traffic:
//!
//! * A ':' inside a middle parameter after its first byte is accepted
//!   (some servers emit hostmasks and similar there).
//! * Trailing whitespace before the terminator is tolerated, except
//!   that a single space after 14 parameters means an empty 15th.
//! * The terminator may be "\r\n", a bare "\n", or absent.

use crate::error::MessageParseError;
use crate::message::{Message, MAX_PARAMS};

fn legal_param_bytes(s: &str) -> bool {
    !s.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n')
}

pub(crate) fn message(input: &str) -> Result<Message, MessageParseError> {
    let line = input
        .strip_suffix("\r\n")
        .or_else(|| input.strip_suffix('\n'))
        .unwrap_or(input);
    if line.is_empty() {
        return Err(MessageParseError::Empty);
    }

    let bytes = line.as_bytes();
    let mut pos = 0;

    let prefix = if bytes[0] == b':' {
        let sp = line.find(' ').ok_or(MessageParseError::PrefixOnly)?;
        if sp == 1 {
            return Err(MessageParseError::EmptyPrefix);
        }
        let p = &line[1..sp];
        if !legal_param_bytes(p) {
            return Err(MessageParseError::InvalidPrefix);
        }
        pos = sp + 1;
        Some(p.to_string())
    } else {
        None
    };

    // Command: one or more letters, or exactly three digits.
    let start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_alphanumeric() {
        pos += 1;
    }
    let cmd = &line[start..pos];
    let letters = !cmd.is_empty() && cmd.bytes().all(|b| b.is_ascii_alphabetic());
    let digits = cmd.len() == 3 && cmd.bytes().all(|b| b.is_ascii_digit());
    if !letters && !digits {
        return Err(MessageParseError::InvalidCommand);
    }
    if pos < bytes.len() && bytes[pos] != b' ' {
        return Err(MessageParseError::InvalidCommand);
    }
    let command = cmd.to_ascii_uppercase();

    let mut params: Vec<String> = Vec::new();
    while pos < bytes.len() {
        // Invariant: bytes[pos] is the space before the next parameter.
        pos += 1;
        if pos >= bytes.len() {
            if params.len() == MAX_PARAMS - 1 {
                params.push(String::new());
            }
            break;
        }

        if params.len() == MAX_PARAMS - 1 {
            // The 15th parameter runs to the end of the line and its
            // ':' sigil is optional.
            let rest = &line[pos..];
            let rest = rest.strip_prefix(':').unwrap_or(rest);
            if !legal_param_bytes(rest) {
                return Err(MessageParseError::InvalidParam);
            }
            params.push(rest.to_string());
            break;
        }

        if bytes[pos] == b':' {
            let rest = &line[pos + 1..];
            if !legal_param_bytes(rest) {
                return Err(MessageParseError::InvalidParam);
            }
            params.push(rest.to_string());
            break;
        }

        let end = line[pos..]
            .find(' ')
            .map(|i| pos + i)
            .unwrap_or(bytes.len());
        let param = &line[pos..end];
        if param.is_empty() {
            // A run of spaces at the end of the line is tolerated;
            // a blank parameter anywhere else is not.
            if line[pos..].bytes().all(|b| b == b' ') {
                break;
            }
            return Err(MessageParseError::EmptyParam);
        }
        if !legal_param_bytes(param) {
            return Err(MessageParseError::InvalidParam);
        }
        params.push(param.to_string());
        pos = end;
    }

    Ok(Message {
        prefix,
        command,
        params,
    })
}
