//! User records, local and remote.

use std::collections::{BTreeSet, HashSet};

use tsirc_proto::Uid;

use super::conn::ConnId;

/// A user known to the network, local or remote.
#[derive(Debug)]
pub struct User {
    pub uid: Uid,
    /// Display form of the nick. The nick table key is the canonical
    /// (case-folded) form.
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub ip: String,
    pub realname: String,
    pub hopcount: u32,
    /// Unix time the nick was last set, for TS6 collision resolution.
    pub nick_ts: i64,
    pub modes: BTreeSet<char>,
    /// Canonical names of channels this user is in.
    pub channels: HashSet<String>,
    /// Local connection, if this user is ours.
    pub conn: Option<ConnId>,
    /// Direct link this user is reachable through, if remote.
    pub link: Option<ConnId>,
}

impl User {
    pub fn is_local(&self) -> bool {
        self.conn.is_some()
    }

    pub fn is_oper(&self) -> bool {
        self.modes.contains(&'o')
    }

    /// nick!~user@host, the prefix for messages sourced from this user
    /// toward local clients.
    pub fn uhost(&self) -> String {
        format!("{}!~{}@{}", self.nick, self.ident, self.host)
    }

    /// Umode string in '+' form, e.g. "+oi". A bare "+" when no modes
    /// are set, as UID bursts require.
    pub fn mode_string(&self) -> String {
        let mut s = String::from("+");
        for m in &self.modes {
            s.push(*m);
        }
        s
    }
}
