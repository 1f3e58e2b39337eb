//! Commands from established server links.
//!
//! State-changing commands flood onward to every other link, never back
//! toward the one they arrived on. Malformed or inconsistent burst
//! traffic is fatal to the link; the two sides no longer agree on the
//! network and the only safe move is a split.

use tracing::info;
use tsirc_proto::valid::{is_valid_channel, is_valid_nick, is_valid_realname, is_valid_user};
use tsirc_proto::{to_canonical, Message, Sid, Uid};

use crate::error::{HandlerError, HandlerResult};
use crate::state::actor::NickOwner;
use crate::state::{Channel, ConnId, Core, LinkStatus, Server, User};

pub(crate) fn dispatch(core: &mut Core, id: ConnId, sid: &Sid, message: &Message) -> HandlerResult {
    match message.command.as_str() {
        "PING" => ping(core, id, sid, message),
        "PONG" => pong(core, id, sid, message),
        "UID" => uid(core, id, message),
        "SID" => server_intro(core, id, message),
        "SJOIN" => sjoin(core, id, message),
        "PRIVMSG" => relay(core, id, message, "PRIVMSG"),
        "NOTICE" => relay(core, id, message, "NOTICE"),
        "QUIT" => quit(core, id, message),
        "PART" => part(core, id, message),
        "NICK" => nick(core, id, message),
        "ERROR" => Err(HandlerError::Quit("peer sent ERROR".to_string())),
        "ENCAP" => Ok(()),
        other => Err(HandlerError::UnknownCommand(other.to_string())),
    }
}

/// Resolve a message's :prefix as a known server SID. Fatal when it is
/// not one; a link speaking about servers we do not know is broken.
fn origin_server(core: &Core, message: &Message) -> Result<Sid, HandlerError> {
    let Some(prefix) = &message.prefix else {
        return Err(HandlerError::Quit(format!(
            "{} without a source",
            message.command
        )));
    };
    let sid: Sid = prefix
        .parse()
        .map_err(|_| HandlerError::Quit(format!("malformed source SID {:?}", prefix)))?;
    if !core.servers.contains_key(&sid) {
        return Err(HandlerError::Quit(format!("unknown source server {}", sid)));
    }
    Ok(sid)
}

/// Resolve a message's :prefix as a known user UID. Fatal when not.
fn origin_user(core: &Core, message: &Message) -> Result<Uid, HandlerError> {
    let Some(prefix) = &message.prefix else {
        return Err(HandlerError::Quit(format!(
            "{} without a source",
            message.command
        )));
    };
    let uid: Uid = prefix
        .parse()
        .map_err(|_| HandlerError::Quit(format!("malformed source UID {:?}", prefix)))?;
    if !core.users.contains_key(&uid) {
        return Err(HandlerError::Quit(format!("unknown source user {}", uid)));
    }
    Ok(uid)
}

/// Update burst bookkeeping on the direct peer, announcing completion
/// once both the peer's PING and its PONG to ours have been seen.
fn note_burst_progress(core: &mut Core, peer: &Sid, update: impl FnOnce(&mut LinkStatus)) {
    let mut finished = None;
    if let Some(server) = core.servers.get_mut(peer) {
        if let Some(status) = &mut server.status {
            update(status);
            if status.bursting && status.burst_complete() {
                status.bursting = false;
                finished = Some(server.name.clone());
            }
        }
    }
    if let Some(name) = finished {
        info!(server = %name, "burst complete");
        core.notice_opers(&format!("Burst with {} over.", name));
    }
}

// PING <origin>, answered with :us PONG <our name> <origin>.
// The peer's burst ends with a PING from itself.
fn ping(core: &mut Core, id: ConnId, peer: &Sid, message: &Message) -> HandlerResult {
    let Some(origin) = message.params.first() else {
        return Err(HandlerError::NeedMoreParams("PING".to_string()));
    };
    let origin_sid: Sid = origin
        .parse()
        .map_err(|_| HandlerError::Quit(format!("malformed PING origin {:?}", origin)))?;
    if !core.servers.contains_key(&origin_sid) {
        return Err(HandlerError::NoSuchServer(origin.clone()));
    }
    let reply = Message::with_prefix(
        core.sid.to_string(),
        "PONG",
        vec![core.config.server.name.clone(), origin_sid.to_string()],
    );
    core.queue(id, reply);
    if origin_sid == *peer {
        note_burst_progress(core, peer, |status| status.got_ping = true);
    }
    Ok(())
}

// :<peer sid> PONG <peer name> <our sid>
fn pong(core: &mut Core, _id: ConnId, peer: &Sid, message: &Message) -> HandlerResult {
    if message.params.len() < 2 {
        return Err(HandlerError::NeedMoreParams("PONG".to_string()));
    }
    if message.prefix.as_deref() != Some(peer.as_str()) {
        return Err(HandlerError::Quit("PONG from unexpected source".to_string()));
    }
    let peer_name = core
        .servers
        .get(peer)
        .map(|s| s.name.clone())
        .unwrap_or_default();
    if message.params[0] != peer_name {
        return Err(HandlerError::Quit("PONG names the wrong server".to_string()));
    }
    if message.params[1] != core.sid.as_str() {
        return Err(HandlerError::Quit("PONG not addressed to us".to_string()));
    }
    note_burst_progress(core, peer, |status| status.got_pong = true);
    Ok(())
}

// :<sid> UID <nick> <hop> <nickTS> <umodes> <user> <host> <ip> <uid> <real>
fn uid(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    origin_server(core, message)?;
    if message.params.len() < 9 {
        return Err(HandlerError::Quit("truncated UID".to_string()));
    }
    let nick = &message.params[0];
    if !is_valid_nick(core.config.server.max_nick_length, nick) {
        return Err(HandlerError::Quit(format!("invalid nick {:?} in UID", nick)));
    }
    let canon = to_canonical(nick);
    if core.nicks.contains_key(&canon) {
        // TS6 collision resolution is a non-goal; a colliding link is
        // dropped outright.
        return Err(HandlerError::Quit(format!("nick collision on {}", nick)));
    }
    let hopcount: u32 = message.params[1]
        .parse()
        .map_err(|_| HandlerError::Quit("bad hopcount in UID".to_string()))?;
    let nick_ts: i64 = message.params[2]
        .parse()
        .map_err(|_| HandlerError::Quit("bad nick TS in UID".to_string()))?;
    let umodes = &message.params[3];
    if !umodes.starts_with('+') {
        return Err(HandlerError::Quit("bad umodes in UID".to_string()));
    }
    let ident = &message.params[4];
    if !is_valid_user(core.config.server.max_nick_length, ident) {
        return Err(HandlerError::Quit("bad username in UID".to_string()));
    }
    let new_uid: Uid = message.params[7]
        .parse()
        .map_err(|_| HandlerError::Quit(format!("malformed UID {:?}", message.params[7])))?;
    if core.users.contains_key(&new_uid) {
        return Err(HandlerError::Quit(format!("duplicate UID {}", new_uid)));
    }
    let realname = &message.params[8];
    if !is_valid_realname(realname) {
        return Err(HandlerError::Quit("bad realname in UID".to_string()));
    }

    // Unknown umode letters are dropped rather than rejected.
    let modes = umodes
        .chars()
        .skip(1)
        .filter(|c| matches!(c, 'i' | 'o'))
        .collect();

    let user = User {
        uid: new_uid.clone(),
        nick: nick.clone(),
        ident: ident.clone(),
        host: message.params[5].clone(),
        ip: message.params[6].clone(),
        realname: realname.clone(),
        hopcount,
        nick_ts,
        modes,
        channels: Default::default(),
        conn: None,
        link: Some(id),
    };
    core.nicks.insert(canon, NickOwner::User(new_uid.clone()));
    core.users.insert(new_uid, user);

    core.flood(Some(id), message);
    Ok(())
}

// :<sid> SID <name> <hop> <new sid> <description>
fn server_intro(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    origin_server(core, message)?;
    if message.params.len() < 4 {
        return Err(HandlerError::NeedMoreParams("SID".to_string()));
    }
    let name = &message.params[0];
    let hopcount: u32 = message.params[1]
        .parse()
        .map_err(|_| HandlerError::Quit("bad hopcount in SID".to_string()))?;
    let new_sid: Sid = message.params[2]
        .parse()
        .map_err(|_| HandlerError::Quit(format!("malformed SID {:?}", message.params[2])))?;
    if core.servers.contains_key(&new_sid) || new_sid == core.sid {
        return Err(HandlerError::Quit(format!("duplicate SID {}", new_sid)));
    }
    core.servers.insert(
        new_sid.clone(),
        Server {
            sid: new_sid,
            name: name.clone(),
            description: message.params[3].clone(),
            hopcount,
            // Reachable through the link that told us about it.
            link: id,
            status: None,
        },
    );
    core.flood(Some(id), message);
    Ok(())
}

// :<sid> SJOIN <chanTS> <name> <modes> [mode params] :<uid list>
fn sjoin(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    origin_server(core, message)?;
    if message.params.len() < 4 {
        return Err(HandlerError::NeedMoreParams("SJOIN".to_string()));
    }
    let ts: i64 = message.params[0]
        .parse()
        .map_err(|_| HandlerError::Quit("bad channel TS in SJOIN".to_string()))?;
    let name = to_canonical(&message.params[1]);
    if !is_valid_channel(&name) {
        return Err(HandlerError::Quit(format!(
            "invalid channel {:?} in SJOIN",
            message.params[1]
        )));
    }

    // Validate the whole member list before touching any state, so a
    // bad SJOIN never leaves a half-created channel behind.
    let mut joiners: Vec<Uid> = Vec::new();
    let list = message.params.last().map(String::as_str).unwrap_or_default();
    for token in list.split_whitespace() {
        let token = token.trim_start_matches(['@', '+']);
        let member: Uid = token
            .parse()
            .map_err(|_| HandlerError::Quit(format!("malformed UID {:?} in SJOIN", token)))?;
        if !core.users.contains_key(&member) {
            return Err(HandlerError::Quit(format!(
                "SJOIN references unknown user {}",
                member
            )));
        }
        joiners.push(member);
    }
    if joiners.is_empty() {
        return Err(HandlerError::Quit("SJOIN with no members".to_string()));
    }

    let channel = core
        .channels
        .entry(name.clone())
        .or_insert_with(|| Channel::new(name.clone(), ts));
    let mut newly: Vec<Uid> = Vec::new();
    for member in joiners {
        if channel.members.insert(member.clone()) {
            newly.push(member);
        }
    }
    let members: Vec<Uid> = channel.members.iter().cloned().collect();

    for member in &newly {
        if let Some(user) = core.users.get_mut(member) {
            user.channels.insert(name.clone());
        }
    }

    // Local members see the remote arrivals as plain JOINs.
    let locals: Vec<ConnId> = members
        .iter()
        .filter_map(|m| core.users.get(m).and_then(|u| u.conn))
        .collect();
    for member in &newly {
        let Some(uhost) = core
            .users
            .get(member)
            .filter(|u| !u.is_local())
            .map(|u| u.uhost())
        else {
            continue;
        };
        let join = Message::with_prefix(uhost, "JOIN", vec![name.clone()]);
        for conn in &locals {
            core.queue(*conn, join.clone());
        }
    }

    core.flood(Some(id), message);
    Ok(())
}

/// PRIVMSG and NOTICE arriving over a link, in UID form. A local target
/// gets the rewritten client form; a target behind another link gets
/// the message forwarded untouched.
fn relay(core: &mut Core, id: ConnId, message: &Message, cmd: &str) -> HandlerResult {
    if message.params.is_empty() {
        return Err(HandlerError::NoRecipient(cmd.to_string()));
    }
    if message.params.len() < 2 {
        return Err(HandlerError::NoTextToSend);
    }
    let source = origin_user(core, message)?;
    let source_uhost = core
        .users
        .get(&source)
        .map(|u| u.uhost())
        .unwrap_or_default();
    let target = &message.params[0];
    let text = message.params[1].clone();

    if target.starts_with('#') {
        let name = to_canonical(target);
        let Some(channel) = core.channels.get(&name) else {
            // The channel emptied while the message was in flight.
            return Ok(());
        };
        let members: Vec<Uid> = channel.members.iter().cloned().collect();
        let local = Message::with_prefix(source_uhost, cmd, vec![name, text]);
        let mut sent_links = std::collections::HashSet::new();
        for member in members {
            if member == source {
                continue;
            }
            let Some((conn, link)) = core.users.get(&member).map(|u| (u.conn, u.link)) else {
                continue;
            };
            if let Some(conn) = conn {
                core.queue(conn, local.clone());
            } else if let Some(link) = link {
                if link != id && sent_links.insert(link) {
                    core.queue(link, message.clone());
                }
            }
        }
        return Ok(());
    }

    let target_uid: Uid = match target.parse() {
        Ok(uid) => uid,
        Err(_) => {
            return Err(HandlerError::Quit(format!(
                "unroutable {} target {:?}",
                cmd, target
            )))
        }
    };
    let Some((t_conn, t_link, t_nick)) = core
        .users
        .get(&target_uid)
        .map(|u| (u.conn, u.link, u.nick.clone()))
    else {
        // Raced with a quit; drop it silently.
        return Ok(());
    };
    if let Some(conn) = t_conn {
        let rewritten = Message::with_prefix(source_uhost, cmd, vec![t_nick, text]);
        core.queue(conn, rewritten);
    } else if let Some(link) = t_link {
        if link != id {
            core.queue(link, message.clone());
        }
    }
    Ok(())
}

// :<uid> QUIT :<reason>
fn quit(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    let source = origin_user(core, message)?;
    let reason = message
        .params
        .first()
        .cloned()
        .unwrap_or_else(|| "Quit".to_string());
    core.drop_user(&source, &reason, Some(id), true);
    Ok(())
}

// :<uid> PART <channel> [:<reason>]
fn part(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    let source = origin_user(core, message)?;
    let Some(raw) = message.params.first() else {
        return Err(HandlerError::NeedMoreParams("PART".to_string()));
    };
    let name = to_canonical(raw);
    let Some(uhost) = core.users.get(&source).map(|u| u.uhost()) else {
        return Ok(());
    };
    let Some(channel) = core.channels.get_mut(&name) else {
        return Ok(());
    };
    if !channel.members.remove(&source) {
        return Ok(());
    }
    let members: Vec<Uid> = channel.members.iter().cloned().collect();
    if channel.members.is_empty() {
        core.channels.remove(&name);
    }
    if let Some(user) = core.users.get_mut(&source) {
        user.channels.remove(&name);
    }

    let mut params = vec![name];
    if let Some(reason) = message.params.get(1) {
        params.push(reason.clone());
    }
    let notify = Message::with_prefix(uhost, "PART", params);
    for member in members {
        if let Some(conn) = core.users.get(&member).and_then(|u| u.conn) {
            core.queue(conn, notify.clone());
        }
    }

    core.flood(Some(id), message);
    Ok(())
}

// :<uid> NICK <new nick> <ts>
fn nick(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    let source = origin_user(core, message)?;
    let Some(new_nick) = message.params.first() else {
        return Err(HandlerError::NeedMoreParams("NICK".to_string()));
    };
    if !is_valid_nick(core.config.server.max_nick_length, new_nick) {
        return Err(HandlerError::Quit(format!(
            "invalid nick {:?} in NICK",
            new_nick
        )));
    }
    let canon = to_canonical(new_nick);
    match core.nicks.get(&canon) {
        Some(NickOwner::User(owner)) if *owner == source => {}
        Some(_) => return Err(HandlerError::Quit(format!("nick collision on {}", new_nick))),
        None => {}
    }
    let ts = message
        .params
        .get(1)
        .and_then(|t| t.parse::<i64>().ok())
        .unwrap_or_else(crate::state::actor::now_ts);

    let Some(user) = core.users.get(&source) else {
        return Ok(());
    };
    let old_canon = to_canonical(&user.nick);
    let uhost = user.uhost();
    let channels = user.channels.clone();

    // Local users sharing a channel see the change once each.
    let change = Message::with_prefix(uhost, "NICK", vec![new_nick.clone()]);
    let mut told = std::collections::HashSet::new();
    told.insert(source.clone());
    let mut targets: Vec<ConnId> = Vec::new();
    for name in &channels {
        let Some(channel) = core.channels.get(name) else {
            continue;
        };
        for member in &channel.members {
            if !told.insert(member.clone()) {
                continue;
            }
            if let Some(conn) = core.users.get(member).and_then(|u| u.conn) {
                targets.push(conn);
            }
        }
    }
    for conn in targets {
        core.queue(conn, change.clone());
    }

    if old_canon != canon {
        core.nicks.remove(&old_canon);
    }
    core.nicks.insert(canon, NickOwner::User(source.clone()));
    if let Some(user) = core.users.get_mut(&source) {
        user.nick = new_nick.clone();
        user.nick_ts = ts;
    }

    core.flood(Some(id), message);
    Ok(())
}
