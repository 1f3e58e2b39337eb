//! Commands from registered local users.

use std::collections::HashSet;

use tracing::info;
use tsirc_proto::valid::{is_valid_channel, is_valid_nick};
use tsirc_proto::{to_canonical, Message, Uid};

use crate::error::{HandlerError, HandlerResult};
use crate::state::actor::{now_ts, NickOwner};
use crate::state::{Channel, ConnId, Core};

pub(crate) fn dispatch(core: &mut Core, id: ConnId, uid: &Uid, message: &Message) -> HandlerResult {
    match message.command.as_str() {
        "PRIVMSG" => relay(core, id, uid, message, "PRIVMSG"),
        "NOTICE" => relay(core, id, uid, message, "NOTICE"),
        "JOIN" => join(core, uid, message),
        "PART" => part(core, uid, message),
        "NICK" => nick(core, uid, message),
        "QUIT" => {
            let reason = message
                .params
                .first()
                .cloned()
                .unwrap_or_else(|| "Client Quit".to_string());
            Err(HandlerError::Quit(reason))
        }
        "PING" => ping(core, id, message),
        "PONG" => Ok(()),
        "OPER" => oper(core, id, uid, message),
        "MOTD" => {
            super::send_motd(core, id);
            Ok(())
        }
        "LUSERS" => {
            super::send_lusers(core, id);
            Ok(())
        }
        // Mode changes are accepted but not modeled; clients send MODE
        // reflexively on connect.
        "MODE" => Ok(()),
        "USER" | "PASS" | "CAPAB" | "SERVER" | "SVINFO" => Ok(()),
        other => Err(HandlerError::UnknownCommand(other.to_string())),
    }
}

/// PRIVMSG and NOTICE delivery.
///
/// A local target gets the message with the sender's nick!user@host
/// prefix and its own display nick. A remote target gets it in UID
/// form, point-routed down the one link it is reachable through.
/// Channel targets fan out the same way, one copy per remote link.
fn relay(
    core: &mut Core,
    _id: ConnId,
    uid: &Uid,
    message: &Message,
    cmd: &str,
) -> HandlerResult {
    if message.params.is_empty() {
        return Err(HandlerError::NoRecipient(cmd.to_string()));
    }
    if message.params.len() < 2 {
        return Err(HandlerError::NoTextToSend);
    }
    let target = &message.params[0];
    let text = message.params[1].clone();
    let Some(sender) = core.users.get(uid) else {
        return Err(HandlerError::Quit("no user record".to_string()));
    };
    let sender_uhost = sender.uhost();

    if target.starts_with('#') {
        let name = to_canonical(target);
        let Some(channel) = core.channels.get(&name) else {
            return Err(HandlerError::NoSuchChannel(target.clone(), "No such channel"));
        };
        if !channel.members.contains(uid) {
            return Err(HandlerError::NoSuchChannel(
                target.clone(),
                "You are not on that channel",
            ));
        }
        let members: Vec<Uid> = channel.members.iter().cloned().collect();
        let local = Message::with_prefix(sender_uhost, cmd, vec![name.clone(), text.clone()]);
        let remote = Message::with_prefix(uid.to_string(), cmd, vec![name.clone(), text]);
        let mut sent_links: HashSet<ConnId> = HashSet::new();
        for member in members {
            if member == *uid {
                continue;
            }
            let Some((conn, link)) = core.users.get(&member).map(|u| (u.conn, u.link)) else {
                continue;
            };
            if let Some(conn) = conn {
                core.queue(conn, local.clone());
            } else if let Some(link) = link {
                if sent_links.insert(link) {
                    core.queue(link, remote.clone());
                }
            }
        }
        return Ok(());
    }

    let canon = to_canonical(target);
    let Some(NickOwner::User(target_uid)) = core.nicks.get(&canon) else {
        return Err(HandlerError::NoSuchNick(target.clone()));
    };
    let target_uid = target_uid.clone();
    let Some((t_conn, t_link, t_nick)) = core
        .users
        .get(&target_uid)
        .map(|u| (u.conn, u.link, u.nick.clone()))
    else {
        return Err(HandlerError::NoSuchNick(target.clone()));
    };
    if let Some(conn) = t_conn {
        let m = Message::with_prefix(sender_uhost, cmd, vec![t_nick, text]);
        core.queue(conn, m);
    } else if let Some(link) = t_link {
        let m = Message::with_prefix(uid.to_string(), cmd, vec![target_uid.to_string(), text]);
        core.queue(link, m);
    }
    Ok(())
}

fn join(core: &mut Core, uid: &Uid, message: &Message) -> HandlerResult {
    let Some(raw) = message.params.first() else {
        return Err(HandlerError::NeedMoreParams("JOIN".to_string()));
    };
    let name = to_canonical(raw);
    if !is_valid_channel(&name) {
        return Err(HandlerError::NoSuchChannel(raw.clone(), "Invalid channel name"));
    }
    let Some(user) = core.users.get(uid) else {
        return Ok(());
    };
    if user.channels.contains(&name) {
        return Ok(());
    }
    let uhost = user.uhost();

    let channel = core
        .channels
        .entry(name.clone())
        .or_insert_with(|| Channel::new(name.clone(), now_ts()));
    channel.members.insert(uid.clone());
    let ts = channel.ts;
    let members: Vec<Uid> = channel.members.iter().cloned().collect();

    if let Some(user) = core.users.get_mut(uid) {
        user.channels.insert(name.clone());
    }

    // Everyone local in the channel, joiner included, sees the JOIN.
    let join = Message::with_prefix(uhost, "JOIN", vec![name.clone()]);
    let mut nicks: Vec<String> = Vec::with_capacity(members.len());
    for member in &members {
        let Some((nick, conn)) = core.users.get(member).map(|u| (u.nick.clone(), u.conn)) else {
            continue;
        };
        nicks.push(nick);
        if let Some(conn) = conn {
            core.queue(conn, join.clone());
        }
    }

    // 353/366 names listing for the joiner.
    if let Some(conn) = core.users.get(uid).and_then(|u| u.conn) {
        let target = core.reply_target(conn);
        let server_name = core.config.server.name.clone();
        core.queue(
            conn,
            Message::with_prefix(
                server_name.clone(),
                "353",
                vec![target.clone(), "=".to_string(), name.clone(), nicks.join(" ")],
            ),
        );
        core.queue(
            conn,
            Message::with_prefix(
                server_name,
                "366",
                vec![target, name.clone(), "End of /NAMES list".to_string()],
            ),
        );
    }

    let sjoin = Message::with_prefix(
        core.sid.to_string(),
        "SJOIN",
        vec![
            ts.to_string(),
            name,
            "+nt".to_string(),
            uid.to_string(),
        ],
    );
    core.flood(None, &sjoin);
    Ok(())
}

fn part(core: &mut Core, uid: &Uid, message: &Message) -> HandlerResult {
    let Some(raw) = message.params.first() else {
        return Err(HandlerError::NeedMoreParams("PART".to_string()));
    };
    let name = to_canonical(raw);
    if !is_valid_channel(&name) {
        return Err(HandlerError::NoSuchChannel(raw.clone(), "Invalid channel name"));
    }
    if !core.channels.contains_key(&name) {
        return Err(HandlerError::NoSuchChannel(raw.clone(), "No such channel"));
    }
    let Some(user) = core.users.get(uid) else {
        return Ok(());
    };
    if !user.channels.contains(&name) {
        return Err(HandlerError::NoSuchChannel(
            raw.clone(),
            "You are not on that channel",
        ));
    }
    let uhost = user.uhost();

    // Notify before removal so the departing user hears their own PART.
    let mut params = vec![name.clone()];
    if let Some(reason) = message.params.get(1) {
        params.push(reason.clone());
    }
    let part = Message::with_prefix(uhost, "PART", params.clone());
    let members: Vec<Uid> = core
        .channels
        .get(&name)
        .map(|c| c.members.iter().cloned().collect())
        .unwrap_or_default();
    for member in members {
        if let Some(conn) = core.users.get(&member).and_then(|u| u.conn) {
            core.queue(conn, part.clone());
        }
    }

    if let Some(channel) = core.channels.get_mut(&name) {
        channel.members.remove(uid);
        if channel.members.is_empty() {
            core.channels.remove(&name);
        }
    }
    if let Some(user) = core.users.get_mut(uid) {
        user.channels.remove(&name);
    }

    let flood = Message::with_prefix(uid.to_string(), "PART", params);
    core.flood(None, &flood);
    Ok(())
}

fn nick(core: &mut Core, uid: &Uid, message: &Message) -> HandlerResult {
    let Some(new_nick) = message.params.first() else {
        return Err(HandlerError::NeedMoreParams("NICK".to_string()));
    };
    if !is_valid_nick(core.config.server.max_nick_length, new_nick) {
        return Err(HandlerError::ErroneousNickname(new_nick.clone()));
    }
    let canon = to_canonical(new_nick);
    match core.nicks.get(&canon) {
        // Changing only the case of your own nick is allowed.
        Some(NickOwner::User(owner)) if owner == uid => {}
        Some(_) => return Err(HandlerError::NicknameInUse(new_nick.clone())),
        None => {}
    }

    let Some(user) = core.users.get(uid) else {
        return Ok(());
    };
    let old_canon = to_canonical(&user.nick);
    let uhost = user.uhost();
    let channels = user.channels.clone();
    let ts = now_ts();

    // Self plus everyone sharing a channel, once each.
    let change = Message::with_prefix(uhost, "NICK", vec![new_nick.clone()]);
    let mut told: HashSet<Uid> = HashSet::new();
    told.insert(uid.clone());
    let mut targets: Vec<ConnId> = core.users.get(uid).and_then(|u| u.conn).into_iter().collect();
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
    core.nicks.insert(canon, NickOwner::User(uid.clone()));
    if let Some(user) = core.users.get_mut(uid) {
        user.nick = new_nick.clone();
        user.nick_ts = ts;
    }

    let flood = Message::with_prefix(
        uid.to_string(),
        "NICK",
        vec![new_nick.clone(), ts.to_string()],
    );
    core.flood(None, &flood);
    Ok(())
}

fn ping(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    let Some(token) = message.params.first() else {
        return Err(HandlerError::NeedMoreParams("PING".to_string()));
    };
    let name = core.config.server.name.clone();
    let reply = Message::with_prefix(name.clone(), "PONG", vec![name, token.clone()]);
    core.queue(id, reply);
    Ok(())
}

fn oper(core: &mut Core, id: ConnId, uid: &Uid, message: &Message) -> HandlerResult {
    if message.params.len() < 2 {
        return Err(HandlerError::NeedMoreParams("OPER".to_string()));
    }
    let matched = core
        .config
        .opers
        .iter()
        .any(|o| o.name == message.params[0] && o.password == message.params[1]);
    if !matched {
        return Err(HandlerError::PasswdMismatch);
    }

    let Some(user) = core.users.get_mut(uid) else {
        return Ok(());
    };
    user.modes.insert('o');
    let nick = user.nick.clone();
    let uhost = user.uhost();
    info!(user = %uid, nick = %nick, "operator login");

    core.numeric(id, "381", vec!["You are now an IRC operator".to_string()]);
    core.queue(
        id,
        Message::with_prefix(uhost, "MODE", vec![nick.clone(), "+o".to_string()]),
    );
    core.notice_opers(&format!("{} has become an operator.", nick));
    Ok(())
}
