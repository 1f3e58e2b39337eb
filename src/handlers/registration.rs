//! Commands from connections that have not finished registering.
//!
//! The first credible command commits the connection to the user path
//! (NICK/USER) or the server path (the TS6 handshake). Crossing over
//! afterwards is fatal.

use std::collections::{BTreeSet, HashSet};
use std::mem;

use tracing::info;
use tsirc_proto::valid::{is_valid_nick, is_valid_realname, is_valid_user};
use tsirc_proto::{to_canonical, Message, Uid};

use crate::error::{HandlerError, HandlerResult};
use crate::state::actor::{now_ts, NickOwner};
use crate::state::{
    ConnId, Core, LinkStatus, PreUser, Registration, Role, Server, User,
};
use crate::sync::handshake::HandshakeMachine;
use crate::sync::burst;

pub(crate) fn dispatch(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    match message.command.as_str() {
        "NICK" => nick(core, id, message),
        "USER" => user(core, id, message),
        "PASS" | "CAPAB" | "SERVER" | "SVINFO" => server_path(core, id, message),
        "QUIT" => Err(HandlerError::Quit("client quit".to_string())),
        "ERROR" => Err(HandlerError::Quit("peer sent ERROR".to_string())),
        // Harmless chatter some clients send before registering.
        "CAP" | "NOTICE" | "PONG" => Ok(()),
        _ => Err(HandlerError::NotRegistered),
    }
}

fn nick(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    let Some(nick) = message.params.first() else {
        return Err(HandlerError::NeedMoreParams("NICK".to_string()));
    };
    if !is_valid_nick(core.config.server.max_nick_length, nick) {
        return Err(HandlerError::ErroneousNickname(nick.clone()));
    }
    let canon = to_canonical(nick);
    match core.nicks.get(&canon) {
        Some(NickOwner::Pending(owner)) if *owner == id => {}
        Some(_) => return Err(HandlerError::NicknameInUse(nick.clone())),
        None => {}
    }

    let old_nick;
    {
        let Some(conn) = core.conns.get_mut(&id) else {
            return Ok(());
        };
        let Role::Pre(reg) = &mut conn.role else {
            return Ok(());
        };
        match mem::take(reg) {
            Registration::Start => {
                old_nick = None;
                *reg = Registration::UserPath {
                    nick: Some(nick.clone()),
                    user: None,
                };
            }
            Registration::UserPath { nick: old, user } => {
                old_nick = old;
                *reg = Registration::UserPath {
                    nick: Some(nick.clone()),
                    user,
                };
            }
            Registration::ServerPath(machine) => {
                *reg = Registration::ServerPath(machine);
                return Err(HandlerError::Quit(
                    "NICK during server handshake".to_string(),
                ));
            }
        }
    }

    if let Some(old) = old_nick {
        let old_canon = to_canonical(&old);
        if old_canon != canon && core.nicks.get(&old_canon) == Some(&NickOwner::Pending(id)) {
            core.nicks.remove(&old_canon);
        }
    }
    core.nicks.insert(canon, NickOwner::Pending(id));
    maybe_complete(core, id)
}

fn user(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    if message.params.len() < 4 {
        return Err(HandlerError::NeedMoreParams("USER".to_string()));
    }
    let ident = &message.params[0];
    let realname = &message.params[3];
    if !is_valid_user(core.config.server.max_nick_length, ident) {
        return Err(HandlerError::Quit("invalid username".to_string()));
    }
    if !is_valid_realname(realname) {
        return Err(HandlerError::Quit("invalid realname".to_string()));
    }

    {
        let Some(conn) = core.conns.get_mut(&id) else {
            return Ok(());
        };
        let Role::Pre(reg) = &mut conn.role else {
            return Ok(());
        };
        let pre = PreUser {
            ident: ident.clone(),
            realname: realname.clone(),
        };
        match mem::take(reg) {
            Registration::Start => {
                *reg = Registration::UserPath {
                    nick: None,
                    user: Some(pre),
                };
            }
            Registration::UserPath { nick, .. } => {
                *reg = Registration::UserPath {
                    nick,
                    user: Some(pre),
                };
            }
            Registration::ServerPath(machine) => {
                *reg = Registration::ServerPath(machine);
                return Err(HandlerError::Quit(
                    "USER during server handshake".to_string(),
                ));
            }
        }
    }
    maybe_complete(core, id)
}

/// Promote the connection to a registered user once both NICK and USER
/// are in.
fn maybe_complete(core: &mut Core, id: ConnId) -> HandlerResult {
    let (nick, pre) = {
        let Some(conn) = core.conns.get_mut(&id) else {
            return Ok(());
        };
        let Role::Pre(reg) = &mut conn.role else {
            return Ok(());
        };
        if !reg.user_path_complete() {
            return Ok(());
        }
        match mem::take(reg) {
            Registration::UserPath {
                nick: Some(nick),
                user: Some(pre),
            } => (nick, pre),
            other => {
                *reg = other;
                return Ok(());
            }
        }
    };

    // The connection serial is the UID serial. A server that has
    // accepted 26^6 connections cannot mint another UID. The nick
    // reservation must not outlive the failed connection.
    let uid = match Uid::from_serial(&core.sid, id) {
        Ok(uid) => uid,
        Err(e) => {
            let canon = to_canonical(&nick);
            if core.nicks.get(&canon) == Some(&NickOwner::Pending(id)) {
                core.nicks.remove(&canon);
            }
            return Err(HandlerError::Quit(e.to_string()));
        }
    };
    let ip = core
        .conns
        .get(&id)
        .map(|c| c.addr.ip().to_string())
        .unwrap_or_default();
    let ts = now_ts();

    let user = User {
        uid: uid.clone(),
        nick: nick.clone(),
        ident: pre.ident.clone(),
        host: ip.clone(),
        ip,
        realname: pre.realname.clone(),
        hopcount: 0,
        nick_ts: ts,
        modes: BTreeSet::new(),
        channels: HashSet::new(),
        conn: Some(id),
        link: None,
    };
    let intro = Message::with_prefix(
        core.sid.to_string(),
        "UID",
        vec![
            nick.clone(),
            "1".to_string(),
            ts.to_string(),
            "+".to_string(),
            user.ident.clone(),
            user.host.clone(),
            user.ip.clone(),
            uid.to_string(),
            user.realname.clone(),
        ],
    );

    core.nicks
        .insert(to_canonical(&nick), NickOwner::User(uid.clone()));
    core.users.insert(uid.clone(), user);
    if let Some(conn) = core.conns.get_mut(&id) {
        conn.role = Role::User(uid.clone());
    }
    info!(conn = id, user = %uid, nick = %nick, "user registered");

    let uhost = core
        .users
        .get(&uid)
        .map(|u| u.uhost())
        .unwrap_or_else(|| nick.clone());
    welcome(core, id, &uhost);
    core.flood(None, &intro);
    Ok(())
}

fn welcome(core: &mut Core, id: ConnId, uhost: &str) {
    let name = core.config.server.name.clone();
    core.numeric(
        id,
        "001",
        vec![format!(
            "Welcome to the Internet Relay Network {}",
            uhost
        )],
    );
    core.numeric(
        id,
        "002",
        vec![format!(
            "Your host is {}, running version {}",
            name,
            crate::VERSION
        )],
    );
    core.numeric(
        id,
        "003",
        vec![format!("This server was created {}", core.started_at.to_rfc2822())],
    );
    core.numeric(
        id,
        "004",
        vec![
            name,
            crate::VERSION.to_string(),
            "o".to_string(),
            "n".to_string(),
        ],
    );
    super::send_lusers(core, id);
    super::send_motd(core, id);
}

/// Feed a handshake command into the connection's machine, answering
/// with whatever the machine owes and promoting the connection to a
/// server link when the handshake completes.
fn server_path(core: &mut Core, id: ConnId, message: &Message) -> HandlerResult {
    let mut machine = {
        let Some(conn) = core.conns.get_mut(&id) else {
            return Ok(());
        };
        let Role::Pre(reg) = &mut conn.role else {
            return Ok(());
        };
        match mem::take(reg) {
            Registration::Start if message.command == "PASS" => HandshakeMachine::inbound(),
            Registration::ServerPath(machine) => machine,
            other => {
                *reg = other;
                return Err(HandlerError::Quit(format!(
                    "{} outside the link handshake",
                    message.command
                )));
            }
        }
    };

    match machine.step(message, &core.config) {
        Ok(outcome) => {
            for reply in outcome.replies {
                core.queue(id, reply);
            }
            if outcome.complete {
                register_server(core, id, machine)
            } else {
                if let Some(conn) = core.conns.get_mut(&id) {
                    conn.role = Role::Pre(Registration::ServerPath(machine));
                }
                Ok(())
            }
        }
        Err(e) => Err(HandlerError::Quit(e.to_string())),
    }
}

fn register_server(core: &mut Core, id: ConnId, machine: HandshakeMachine) -> HandlerResult {
    let (Some(sid), Some(name), Some(description)) =
        (machine.sid.clone(), machine.name.clone(), machine.description.clone())
    else {
        return Err(HandlerError::Quit("incomplete handshake".to_string()));
    };
    if core.servers.contains_key(&sid) {
        return Err(HandlerError::Quit(format!("SID {} already in use", sid)));
    }

    let Some(conn) = core.conns.get_mut(&id) else {
        return Ok(());
    };
    conn.role = Role::Server(sid.clone());
    core.servers.insert(
        sid.clone(),
        Server {
            sid: sid.clone(),
            name: name.clone(),
            description: description.clone(),
            hopcount: 1,
            link: id,
            status: Some(LinkStatus::new()),
        },
    );
    info!(conn = id, server = %name, %sid, "server link established");
    core.notice_opers(&format!("Established link to {}.", name));

    // Introduce the new peer to the rest of the network.
    let intro = Message::with_prefix(
        core.sid.to_string(),
        "SID",
        vec![name, "2".to_string(), sid.to_string(), description],
    );
    core.flood(Some(id), &intro);

    // Burst our view of the network, then PING to mark its end.
    for message in burst::messages(core, id) {
        core.queue(id, message);
    }
    core.queue(id, Message::new("PING", vec![core.sid.to_string()]));
    Ok(())
}
