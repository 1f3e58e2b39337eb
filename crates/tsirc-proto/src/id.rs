//! TS6 network identifiers.
//!
//! A SID names a server: a digit followed by two uppercase
//! alphanumerics, e.g. `1ST`. A UID names a user: the introducing
//! server's SID followed by six uppercase letters, e.g. `1STAAAAAB`.
//! Both are network-unique and never reassigned for the lifetime of
//! what they name.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of distinct UID tails a single server can mint (26^6).
pub const UID_SERIAL_SPACE: u64 = 308_915_776;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid SID {0:?}")]
    InvalidSid(String),

    #[error("invalid UID {0:?}")]
    InvalidUid(String),

    #[error("connection serial {0} exhausts the UID space")]
    SerialOverflow(u64),
}

/// A TS6 server identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid(String);

impl Sid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Sid {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        let valid = b.len() == 3
            && b[0].is_ascii_digit()
            && b[1..]
                .iter()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase());
        if !valid {
            return Err(IdError::InvalidSid(s.to_string()));
        }
        Ok(Sid(s.to_string()))
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Sid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A TS6 user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(String);

impl Uid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The SID of the server that introduced this user.
    pub fn sid(&self) -> Sid {
        Sid(self.0[..3].to_string())
    }

    /// Mint the UID for the `serial`-th local connection of `sid`.
    ///
    /// The six-letter tail is `serial` in base 26 over `A`..`Z`, most
    /// significant digit first, so serial 0 is `AAAAAA` and serial 1 is
    /// `AAAAAB`. Serials at or beyond [`UID_SERIAL_SPACE`] cannot be
    /// represented and are refused.
    pub fn from_serial(sid: &Sid, serial: u64) -> Result<Self, IdError> {
        if serial >= UID_SERIAL_SPACE {
            return Err(IdError::SerialOverflow(serial));
        }
        let mut tail = [b'A'; 6];
        let mut n = serial;
        for slot in tail.iter_mut().rev() {
            *slot = b'A' + (n % 26) as u8;
            n /= 26;
        }
        let mut s = String::with_capacity(9);
        s.push_str(sid.as_str());
        for b in tail {
            s.push(b as char);
        }
        Ok(Uid(s))
    }
}

impl FromStr for Uid {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 9 {
            return Err(IdError::InvalidUid(s.to_string()));
        }
        if s[..3].parse::<Sid>().is_err() {
            return Err(IdError::InvalidUid(s.to_string()));
        }
        if !s.as_bytes()[3..].iter().all(|b| b.is_ascii_uppercase()) {
            return Err(IdError::InvalidUid(s.to_string()));
        }
        Ok(Uid(s.to_string()))
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
