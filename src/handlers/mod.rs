//! Command dispatch, split by connection role.

pub(crate) mod registration;
pub(crate) mod server;
pub(crate) mod user;

use crate::state::{ConnId, Core};

/// 375/372/376 MOTD sequence.
pub(crate) fn send_motd(core: &mut Core, id: ConnId) {
    let name = core.config.server.name.clone();
    let lines = core.config.motd.lines.clone();
    core.numeric(id, "375", vec![format!("- {} Message of the day - ", name)]);
    for line in lines {
        core.numeric(id, "372", vec![format!("- {}", line)]);
    }
    core.numeric(id, "376", vec!["End of /MOTD command".to_string()]);
}

/// 251 LUSERS summary.
pub(crate) fn send_lusers(core: &mut Core, id: ConnId) {
    let users = core.users.len();
    let servers = core.servers.len() + 1;
    core.numeric(
        id,
        "251",
        vec![format!(
            "There are {} users and 0 services on {} servers",
            users, servers
        )],
    );
}
