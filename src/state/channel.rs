//! Channel records.

use std::collections::HashSet;

use tsirc_proto::Uid;

/// A channel. Exists only while it has members; the core removes the
/// record when the last member leaves.
#[derive(Debug)]
pub struct Channel {
    /// Canonical (case-folded) name.
    pub name: String,
    /// Creation time, for TS6 SJOIN exchange.
    pub ts: i64,
    pub members: HashSet<Uid>,
}

impl Channel {
    pub fn new(name: String, ts: i64) -> Self {
        Self {
            name,
            ts,
            members: HashSet::new(),
        }
    }
}
