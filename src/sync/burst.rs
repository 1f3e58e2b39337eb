//! Initial burst toward a freshly established link.
//!
//! The burst replays our whole view of the network as SID, UID, and
//! SJOIN commands: every server except the peer itself, every user, and
//! every channel membership. Hopcounts are shifted by one since the
//! peer is a hop further from everything than we are.

use tsirc_proto::Message;

use crate::state::{ConnId, Core};

pub(crate) fn messages(core: &Core, peer: ConnId) -> Vec<Message> {
    let my_sid = core.sid.to_string();
    let mut out = Vec::new();

    for server in core.servers.values() {
        if server.link == peer {
            continue;
        }
        out.push(Message::with_prefix(
            my_sid.clone(),
            "SID",
            vec![
                server.name.clone(),
                (server.hopcount + 1).to_string(),
                server.sid.to_string(),
                server.description.clone(),
            ],
        ));
    }

    for user in core.users.values() {
        out.push(Message::with_prefix(
            my_sid.clone(),
            "UID",
            vec![
                user.nick.clone(),
                (user.hopcount + 1).to_string(),
                user.nick_ts.to_string(),
                user.mode_string(),
                user.ident.clone(),
                user.host.clone(),
                user.ip.clone(),
                user.uid.to_string(),
                user.realname.clone(),
            ],
        ));
    }

    for channel in core.channels.values() {
        for member in &channel.members {
            out.push(Message::with_prefix(
                my_sid.clone(),
                "SJOIN",
                vec![
                    channel.ts.to_string(),
                    channel.name.clone(),
                    "+nt".to_string(),
                    member.to_string(),
                ],
            ));
        }
    }

    out
}
