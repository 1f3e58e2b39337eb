//! The event core.
//!
//! All server state lives here and is touched by exactly one task: the
//! core loop consumes events from the connection tasks and mutates the
//! tables directly. No locks, no concurrent writers, and every handler
//! sees a consistent snapshot.
//!
//! Outbound traffic never blocks the core. Messages are pushed onto
//! per-connection bounded queues with `try_send`; a connection whose
//! queue fills is flagged and torn down on the next sweep, so one slow
//! client cannot stall the rest of the network.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use tsirc_proto::{to_canonical, Message, Sid, Uid};

use crate::config::{Config, LinkBlock};
use crate::error::HandlerError;
use crate::handlers;
use crate::sync::handshake;

use super::channel::Channel;
use super::conn::{Conn, ConnId, Role};
use super::registration::Registration;
use super::server::Server;
use super::user::User;

/// Depth of the core's inbound event queue.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Everything the connection tasks can tell the core.
#[derive(Debug)]
pub enum Event {
    /// A new connection is up and its writer task is running.
    Accepted {
        id: ConnId,
        addr: SocketAddr,
        tx: mpsc::Sender<Message>,
        /// Present when we dialed this peer as a server link.
        link: Option<LinkBlock>,
    },
    /// A parsed message arrived from the connection.
    Message { id: ConnId, message: Message },
    /// The connection is gone: EOF, error, read timeout, or an
    /// unparseable line.
    Dead { id: ConnId, reason: String },
}

/// Who holds a canonical nick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NickOwner {
    /// Reserved by an unregistered connection that sent NICK.
    Pending(ConnId),
    /// Held by a registered user.
    User(Uid),
}

/// The single owner of all server state.
pub struct Core {
    pub(crate) config: Config,
    pub(crate) sid: Sid,
    pub(crate) started_at: DateTime<Utc>,
    rx: mpsc::Receiver<Event>,

    pub(crate) conns: HashMap<ConnId, Conn>,
    /// Canonical nick to owner.
    pub(crate) nicks: HashMap<String, NickOwner>,
    pub(crate) users: HashMap<Uid, User>,
    pub(crate) servers: HashMap<Sid, Server>,
    /// Canonical channel name to channel. No empty channels.
    pub(crate) channels: HashMap<String, Channel>,
}

impl Core {
    pub fn new(config: Config) -> anyhow::Result<(Self, mpsc::Sender<Event>)> {
        let sid: Sid = config
            .server
            .sid
            .parse()
            .context("server.sid is not a valid SID")?;
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let core = Self {
            config,
            sid,
            started_at: Utc::now(),
            rx,
            conns: HashMap::new(),
            nicks: HashMap::new(),
            users: HashMap::new(),
            servers: HashMap::new(),
            channels: HashMap::new(),
        };
        Ok((core, tx))
    }

    /// Run until every event sender is gone.
    pub async fn run(mut self) {
        info!(server = %self.config.server.name, sid = %self.sid, "event core running");
        while let Some(event) = self.rx.recv().await {
            self.handle_event(event);
        }
    }

    pub(crate) fn handle_event(&mut self, event: Event) {
        match event {
            Event::Accepted { id, addr, tx, link } => self.handle_accepted(id, addr, tx, link),
            Event::Message { id, message } => self.handle_message(id, message),
            Event::Dead { id, reason } => self.disconnect(id, &reason),
        }
        self.sweep_overflowed();
    }

    fn handle_accepted(
        &mut self,
        id: ConnId,
        addr: SocketAddr,
        tx: mpsc::Sender<Message>,
        link: Option<LinkBlock>,
    ) {
        let mut conn = Conn::new(id, addr, tx);
        match link {
            None => {
                debug!(conn = id, %addr, "connection accepted");
                self.conns.insert(id, conn);
            }
            Some(link) => {
                // We dialed this peer: announce ourselves and wait for
                // its half of the handshake.
                debug!(conn = id, %addr, peer = %link.name, "outbound link connected");
                conn.role = Role::Pre(Registration::ServerPath(handshake::HandshakeMachine::outbound()));
                self.conns.insert(id, conn);
                for message in handshake::opening_messages(&self.config, &link) {
                    self.queue(id, message);
                }
            }
        }
    }

    fn handle_message(&mut self, id: ConnId, message: Message) {
        trace!(conn = id, msg = %message, "received");

        enum Kind {
            Pre,
            User(Uid),
            Server(Sid),
        }
        let kind = match self.conns.get(&id) {
            None => return,
            Some(conn) => match &conn.role {
                Role::Pre(_) => Kind::Pre,
                Role::User(uid) => Kind::User(uid.clone()),
                Role::Server(sid) => Kind::Server(sid.clone()),
            },
        };

        let result = match kind {
            Kind::Pre => handlers::registration::dispatch(self, id, &message),
            Kind::User(uid) => handlers::user::dispatch(self, id, &uid, &message),
            Kind::Server(sid) => handlers::server::dispatch(self, id, &sid, &message),
        };

        if let Err(e) = result {
            match e {
                HandlerError::Quit(reason) => self.disconnect(id, &reason),
                other => {
                    if let Some((code, params)) = other.numeric() {
                        self.numeric(id, code, params);
                    }
                }
            }
        }
    }

    /// Queue a message to one connection, if it still exists.
    pub(crate) fn queue(&mut self, id: ConnId, message: Message) {
        if let Some(conn) = self.conns.get_mut(&id) {
            conn.queue(message);
        }
    }

    /// Send a numeric reply, prefixed with our name and targeted at the
    /// connection's nick ("*" before registration, the SID for links).
    pub(crate) fn numeric(&mut self, id: ConnId, code: &str, params: Vec<String>) {
        let target = self.reply_target(id);
        let mut full = Vec::with_capacity(params.len() + 1);
        full.push(target);
        full.extend(params);
        let message = Message::with_prefix(self.config.server.name.clone(), code, full);
        self.queue(id, message);
    }

    pub(crate) fn reply_target(&self, id: ConnId) -> String {
        match self.conns.get(&id).map(|c| &c.role) {
            Some(Role::User(uid)) => self
                .users
                .get(uid)
                .map(|u| u.nick.clone())
                .unwrap_or_else(|| "*".to_string()),
            Some(Role::Server(sid)) => sid.to_string(),
            Some(Role::Pre(reg)) => reg
                .pending_nick()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "*".to_string()),
            None => "*".to_string(),
        }
    }

    /// Send a message to every established server link except `except`.
    /// Split horizon: propagation never goes back the way it came.
    pub(crate) fn flood(&mut self, except: Option<ConnId>, message: &Message) {
        let links: Vec<ConnId> = self
            .conns
            .values()
            .filter(|c| c.is_server() && Some(c.id) != except)
            .map(|c| c.id)
            .collect();
        for id in links {
            self.queue(id, message.clone());
        }
    }

    /// NOTICE every local operator.
    pub(crate) fn notice_opers(&mut self, text: &str) {
        let targets: Vec<(ConnId, String)> = self
            .users
            .values()
            .filter(|u| u.is_oper())
            .filter_map(|u| u.conn.map(|c| (c, u.nick.clone())))
            .collect();
        let server_name = self.config.server.name.clone();
        for (id, nick) in targets {
            let message = Message::with_prefix(
                server_name.clone(),
                "NOTICE",
                vec![nick, text.to_string()],
            );
            self.queue(id, message);
        }
    }

    /// Tear down a connection and everything that depended on it.
    pub(crate) fn disconnect(&mut self, id: ConnId, reason: &str) {
        let Some(mut conn) = self.conns.remove(&id) else {
            return;
        };
        conn.queue(Message::with_prefix(
            self.config.server.name.clone(),
            "ERROR",
            vec![format!("Closing link: {}", reason)],
        ));
        match conn.role {
            Role::Pre(reg) => {
                if let Some(nick) = reg.pending_nick() {
                    let canon = to_canonical(nick);
                    if self.nicks.get(&canon) == Some(&NickOwner::Pending(id)) {
                        self.nicks.remove(&canon);
                    }
                }
                debug!(conn = id, %reason, "dropping unregistered connection");
            }
            Role::User(uid) => {
                info!(conn = id, user = %uid, %reason, "dropping local user");
                self.drop_user(&uid, reason, None, true);
            }
            Role::Server(sid) => {
                self.drop_link(id, &sid, reason);
            }
        }
        // The writer task exits once the queue sender is dropped.
    }

    /// Remove a user everywhere: tables, channels, and channel member
    /// notifications. When `flood` is set the QUIT is also propagated
    /// to links other than `except`.
    pub(crate) fn drop_user(
        &mut self,
        uid: &Uid,
        reason: &str,
        except: Option<ConnId>,
        flood: bool,
    ) {
        let Some(user) = self.users.remove(uid) else {
            return;
        };
        self.nicks.remove(&to_canonical(&user.nick));

        // Tell each local user sharing a channel exactly once, no
        // matter how many channels they share.
        let quit = Message::with_prefix(user.uhost(), "QUIT", vec![reason.to_string()]);
        let mut told: HashSet<Uid> = HashSet::new();
        let mut targets: Vec<ConnId> = Vec::new();
        for name in &user.channels {
            let Some(channel) = self.channels.get_mut(name) else {
                continue;
            };
            channel.members.remove(uid);
            let members: Vec<Uid> = channel.members.iter().cloned().collect();
            if channel.members.is_empty() {
                self.channels.remove(name);
            }
            for member in members {
                if !told.insert(member.clone()) {
                    continue;
                }
                if let Some(conn) = self.users.get(&member).and_then(|u| u.conn) {
                    targets.push(conn);
                }
            }
        }
        for conn in targets {
            self.queue(conn, quit.clone());
        }

        if flood {
            let message =
                Message::with_prefix(uid.to_string(), "QUIT", vec![reason.to_string()]);
            self.flood(except, &message);
        }
    }

    /// A direct link died. Everything behind it goes with it: servers
    /// reachable through the link and users introduced over it.
    fn drop_link(&mut self, id: ConnId, sid: &Sid, reason: &str) {
        let name = self
            .servers
            .get(sid)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| sid.to_string());
        warn!(conn = id, server = %name, %reason, "lost server link");

        let lost: Vec<Sid> = self
            .servers
            .values()
            .filter(|s| s.link == id)
            .map(|s| s.sid.clone())
            .collect();
        for s in &lost {
            self.servers.remove(s);
        }

        let gone: Vec<Uid> = self
            .users
            .values()
            .filter(|u| u.link == Some(id))
            .map(|u| u.uid.clone())
            .collect();
        let split_reason = format!("{} {}", self.config.server.name, name);
        for uid in &gone {
            self.drop_user(uid, &split_reason, None, false);
        }

        self.notice_opers(&format!(
            "Lost link to {} ({}). Split {} servers and {} users.",
            name,
            reason,
            lost.len(),
            gone.len()
        ));
    }

    /// Drop every connection whose send queue overflowed since the last
    /// event.
    fn sweep_overflowed(&mut self) {
        let flagged: Vec<ConnId> = self
            .conns
            .values()
            .filter(|c| c.send_queue_exceeded)
            .map(|c| c.id)
            .collect();
        for id in flagged {
            warn!(conn = id, "send queue exceeded");
            self.disconnect(id, "SendQ exceeded");
        }
    }
}

/// Current unix time, the TS in TS6.
pub(crate) fn now_ts() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ListenConfig, MotdConfig, OperBlock, ServerConfig};
    use crate::state::{LinkStatus, SEND_QUEUE_CAPACITY};
    use std::collections::BTreeSet;

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                name: "irc.example.org".into(),
                sid: "1ST".into(),
                description: "test server".into(),
                max_nick_length: 15,
                dead_time_secs: 300,
            },
            listen: ListenConfig {
                address: "127.0.0.1:6667".parse().unwrap(),
            },
            opers: vec![OperBlock {
                name: "will".into(),
                password: "hunter2".into(),
            }],
            links: vec![],
            motd: MotdConfig::default(),
        }
    }

    fn core() -> Core {
        Core::new(test_config()).unwrap().0
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    /// Accept a plain client connection, returning its outbound queue.
    fn accept(core: &mut Core, id: ConnId) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        core.handle_event(Event::Accepted {
            id,
            addr: addr(),
            tx,
            link: None,
        });
        rx
    }

    fn send(core: &mut Core, id: ConnId, line: &str) {
        let message: Message = line.parse().unwrap();
        core.handle_event(Event::Message { id, message });
    }

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    /// Register a local user the front-door way.
    fn register(core: &mut Core, id: ConnId, nick: &str) -> (Uid, mpsc::Receiver<Message>) {
        let mut rx = accept(core, id);
        send(core, id, &format!("NICK {}\r\n", nick));
        send(core, id, &format!("USER {} 0 * :Test User\r\n", nick));
        drain(&mut rx);
        let uid = match core.conns.get(&id).map(|c| &c.role) {
            Some(Role::User(uid)) => uid.clone(),
            other => panic!("not registered: {:?}", other),
        };
        (uid, rx)
    }

    /// Wire up an established server link directly, skipping the
    /// handshake, and return its outbound queue.
    fn link_server(core: &mut Core, id: ConnId, sid: &str, name: &str) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let mut conn = Conn::new(id, addr(), tx);
        let sid: Sid = sid.parse().unwrap();
        conn.role = Role::Server(sid.clone());
        core.conns.insert(id, conn);
        core.servers.insert(
            sid.clone(),
            Server {
                sid,
                name: name.into(),
                description: "peer".into(),
                hopcount: 1,
                link: id,
                status: Some(LinkStatus {
                    bursting: false,
                    got_ping: true,
                    got_pong: true,
                }),
            },
        );
        rx
    }

    #[test]
    fn nick_then_user_registers() {
        let mut core = core();
        let mut rx = accept(&mut core, 0);
        send(&mut core, 0, "NICK will\r\n");
        send(&mut core, 0, "USER will 0 * :Will Jones\r\n");

        let messages = drain(&mut rx);
        assert_eq!(messages[0].command, "001");
        assert_eq!(messages[0].params[0], "will");
        assert!(messages[0].params[1].starts_with("Welcome"));
        let codes: Vec<&str> = messages.iter().map(|m| m.command.as_str()).collect();
        assert!(codes.contains(&"002"));
        assert!(codes.contains(&"004"));
        assert!(codes.contains(&"251"));

        // First connection serial mints the first UID.
        let uid: Uid = "1STAAAAAA".parse().unwrap();
        assert!(core.users.contains_key(&uid));
        assert_eq!(core.nicks.get("will"), Some(&NickOwner::User(uid.clone())));
        assert!(matches!(
            core.conns.get(&0).map(|c| &c.role),
            Some(Role::User(u)) if *u == uid
        ));
    }

    #[test]
    fn user_then_nick_registers_too() {
        let mut core = core();
        let mut rx = accept(&mut core, 0);
        send(&mut core, 0, "USER will 0 * :Will Jones\r\n");
        send(&mut core, 0, "NICK will\r\n");
        let messages = drain(&mut rx);
        assert_eq!(messages[0].command, "001");
    }

    #[test]
    fn nick_collision_gets_433() {
        let mut core = core();
        let (_uid, _rx0) = register(&mut core, 0, "will");

        let mut rx1 = accept(&mut core, 1);
        // Differs only by case folding, still a collision.
        send(&mut core, 1, "NICK WILL\r\n");
        let messages = drain(&mut rx1);
        assert_eq!(messages[0].command, "433");
        assert_eq!(messages[0].params, vec!["*", "WILL", "Nickname is already in use"]);
    }

    #[test]
    fn pending_nick_released_on_disconnect() {
        let mut core = core();
        let _rx = accept(&mut core, 0);
        send(&mut core, 0, "NICK will\r\n");
        assert_eq!(core.nicks.get("will"), Some(&NickOwner::Pending(0)));

        core.handle_event(Event::Dead {
            id: 0,
            reason: "connection closed".into(),
        });
        assert!(core.nicks.is_empty());
        assert!(core.conns.is_empty());
    }

    #[test]
    fn command_before_registration_gets_451() {
        let mut core = core();
        let mut rx = accept(&mut core, 0);
        send(&mut core, 0, "PRIVMSG will :hi\r\n");
        let messages = drain(&mut rx);
        assert_eq!(messages[0].command, "451");
    }

    #[test]
    fn join_creates_channel_and_part_removes_it() {
        let mut core = core();
        let (uid, mut rx) = register(&mut core, 0, "will");

        send(&mut core, 0, "JOIN #Test\r\n");
        let channel = core.channels.get("#test").expect("channel created");
        assert!(channel.members.contains(&uid));
        let messages = drain(&mut rx);
        assert_eq!(messages[0].command, "JOIN");
        assert_eq!(messages[0].params, vec!["#test"]);

        send(&mut core, 0, "PART #test :bye\r\n");
        assert!(core.channels.is_empty(), "empty channel must be removed");
        assert!(core.users.get(&uid).unwrap().channels.is_empty());
    }

    #[test]
    fn quit_removes_user_and_notifies_channel() {
        let mut core = core();
        let (_uid0, mut rx0) = register(&mut core, 0, "will");
        let (_uid1, mut rx1) = register(&mut core, 1, "toby");
        send(&mut core, 0, "JOIN #test\r\n");
        send(&mut core, 1, "JOIN #test\r\n");
        drain(&mut rx0);
        drain(&mut rx1);

        send(&mut core, 1, "QUIT :gone\r\n");
        assert!(core.conns.get(&1).is_none());
        assert!(core.nicks.get("toby").is_none());
        let messages = drain(&mut rx0);
        assert_eq!(messages[0].command, "QUIT");
        assert!(messages[0].prefix.as_deref().unwrap().starts_with("toby!"));

        // Channel still has its remaining member.
        assert_eq!(core.channels.get("#test").unwrap().members.len(), 1);
    }

    #[test]
    fn local_privmsg_is_rewritten() {
        let mut core = core();
        let (_u0, _rx0) = register(&mut core, 0, "will");
        let (_u1, mut rx1) = register(&mut core, 1, "Toby");

        send(&mut core, 0, "PRIVMSG toby :hello\r\n");
        let messages = drain(&mut rx1);
        assert_eq!(messages[0].command, "PRIVMSG");
        assert!(messages[0].prefix.as_deref().unwrap().starts_with("will!~"));
        // Delivered with the display nick, not the canonical form.
        assert_eq!(messages[0].params, vec!["Toby", "hello"]);
    }

    #[test]
    fn privmsg_to_unknown_nick_gets_401() {
        let mut core = core();
        let (_u0, mut rx0) = register(&mut core, 0, "will");
        send(&mut core, 0, "PRIVMSG nobody :hello\r\n");
        let messages = drain(&mut rx0);
        assert_eq!(messages[0].command, "401");
    }

    #[test]
    fn remote_user_intro_and_privmsg_forwarding() {
        let mut core = core();
        let (u0, _rx0) = register(&mut core, 0, "will");
        let mut link_rx = link_server(&mut core, 10, "2HB", "hub.example.org");
        drain(&mut link_rx);

        // The peer introduces a remote user.
        send(
            &mut core,
            10,
            ":2HB UID toby 1 1700000000 + toby 10.0.0.9 10.0.0.9 2HBAAAAAA :Toby\r\n",
        );
        let remote: Uid = "2HBAAAAAA".parse().unwrap();
        assert!(core.users.contains_key(&remote));
        assert_eq!(core.nicks.get("toby"), Some(&NickOwner::User(remote.clone())));

        // A local PRIVMSG to the remote nick is point-routed down the
        // link in UID form, unmodified otherwise.
        send(&mut core, 0, "PRIVMSG toby :hello\r\n");
        let out = drain(&mut link_rx);
        let forwarded = out.last().unwrap();
        assert_eq!(forwarded.command, "PRIVMSG");
        assert_eq!(forwarded.prefix.as_deref(), Some(u0.as_str()));
        assert_eq!(forwarded.params, vec!["2HBAAAAAA".to_string(), "hello".to_string()]);
    }

    #[test]
    fn remote_privmsg_to_local_user_is_rewritten() {
        let mut core = core();
        let (u0, mut rx0) = register(&mut core, 0, "will");
        let mut link_rx = link_server(&mut core, 10, "2HB", "hub.example.org");
        send(
            &mut core,
            10,
            ":2HB UID toby 1 1700000000 + toby 10.0.0.9 10.0.0.9 2HBAAAAAA :Toby\r\n",
        );
        drain(&mut rx0);
        drain(&mut link_rx);

        send(
            &mut core,
            10,
            &format!(":2HBAAAAAA PRIVMSG {} :hi will\r\n", u0),
        );
        let messages = drain(&mut rx0);
        assert_eq!(messages[0].command, "PRIVMSG");
        assert!(messages[0].prefix.as_deref().unwrap().starts_with("toby!~"));
        assert_eq!(messages[0].params, vec!["will", "hi will"]);
    }

    #[test]
    fn privmsg_between_two_links_forwards_unmodified() {
        let mut core = core();
        let mut rx_a = link_server(&mut core, 10, "8ZZ", "a.example.org");
        let mut rx_b = link_server(&mut core, 11, "9ZQ", "b.example.org");
        send(
            &mut core,
            10,
            ":8ZZ UID anna 1 1700000000 + anna 10.0.0.8 10.0.0.8 8ZZAAAAAB :Anna\r\n",
        );
        send(
            &mut core,
            11,
            ":9ZQ UID toby 1 1700000000 + toby 10.0.0.9 10.0.0.9 9ZQAAAAAA :Toby\r\n",
        );
        drain(&mut rx_a);
        drain(&mut rx_b);

        // Neither endpoint is local, so the message transits untouched:
        // no prefix rewrite, no target rewrite.
        send(&mut core, 11, ":9ZQAAAAAA PRIVMSG 8ZZAAAAAB :hi anna\r\n");
        let out = drain(&mut rx_a);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].prefix.as_deref(), Some("9ZQAAAAAA"));
        assert_eq!(out[0].params, vec!["8ZZAAAAAB", "hi anna"]);
        assert!(drain(&mut rx_b).is_empty(), "never echoed to the origin");
    }

    #[test]
    fn sjoin_creates_channel_with_remote_ts() {
        let mut core = core();
        let mut link_rx = link_server(&mut core, 10, "2HB", "hub.example.org");
        send(
            &mut core,
            10,
            ":2HB UID toby 1 1700000000 + toby 10.0.0.9 10.0.0.9 2HBAAAAAA :Toby\r\n",
        );
        drain(&mut link_rx);

        send(&mut core, 10, ":2HB SJOIN 1690000000 #Test +nt :@2HBAAAAAA\r\n");
        let channel = core.channels.get("#test").expect("channel created");
        assert_eq!(channel.ts, 1_690_000_000);
        // Status sigils are stripped before UID lookup.
        let remote: Uid = "2HBAAAAAA".parse().unwrap();
        assert!(channel.members.contains(&remote));
        assert!(core.users.get(&remote).unwrap().channels.contains("#test"));
    }

    #[test]
    fn sjoin_with_unknown_uid_drops_the_link() {
        let mut core = core();
        let _link_rx = link_server(&mut core, 10, "2HB", "hub.example.org");
        send(&mut core, 10, ":2HB SJOIN 1690000000 #test +nt :@2HBZZZZZZ\r\n");
        assert!(core.conns.get(&10).is_none(), "link must be torn down");
        assert!(core.channels.is_empty(), "no empty channel left behind");
    }

    #[test]
    fn burst_completes_only_after_both_ping_and_pong() {
        let mut core = core();
        let (_uid, mut oper_rx) = register(&mut core, 0, "will");
        send(&mut core, 0, "OPER will hunter2\r\n");
        drain(&mut oper_rx);

        let mut link_rx = link_server(&mut core, 10, "2HB", "hub.example.org");
        let peer: Sid = "2HB".parse().unwrap();
        if let Some(server) = core.servers.get_mut(&peer) {
            server.status = Some(LinkStatus::new());
        }

        // The peer's burst-ending PING earns a PONG but only counts as
        // half of completion.
        send(&mut core, 10, ":2HB PING 2HB\r\n");
        let status = core.servers.get(&peer).unwrap().status.as_ref().unwrap();
        assert!(status.got_ping);
        assert!(!status.got_pong);
        assert!(status.bursting, "one half of the pair must not finish the burst");
        let out = drain(&mut link_rx);
        assert_eq!(out[0].command, "PONG");
        assert_eq!(out[0].params, vec!["irc.example.org", "2HB"]);
        assert!(drain(&mut oper_rx).is_empty());

        // Its PONG to our burst-ending PING finishes the exchange.
        send(&mut core, 10, ":2HB PONG hub.example.org 1ST\r\n");
        let status = core.servers.get(&peer).unwrap().status.as_ref().unwrap();
        assert!(status.got_pong);
        assert!(!status.bursting);
        let notices = drain(&mut oper_rx);
        assert!(notices
            .iter()
            .any(|m| m.command == "NOTICE" && m.params[1] == "Burst with hub.example.org over."));
    }

    #[test]
    fn pong_from_unexpected_source_drops_the_link() {
        let mut core = core();
        let _link_rx = link_server(&mut core, 10, "2HB", "hub.example.org");
        send(&mut core, 10, ":3XX PONG hub.example.org 1ST\r\n");
        assert!(core.conns.get(&10).is_none());
    }

    #[test]
    fn pong_addressed_elsewhere_drops_the_link() {
        let mut core = core();
        let _link_rx = link_server(&mut core, 10, "2HB", "hub.example.org");
        send(&mut core, 10, ":2HB PONG hub.example.org 9ZZ\r\n");
        assert!(core.conns.get(&10).is_none());
    }

    #[test]
    fn uid_overflow_releases_the_pending_nick() {
        let mut core = core();
        let id = tsirc_proto::UID_SERIAL_SPACE;
        let mut rx = accept(&mut core, id);
        send(&mut core, id, "NICK will\r\n");
        send(&mut core, id, "USER will 0 * :Will Jones\r\n");

        // The serial cannot mint a UID, so the connection dies and its
        // reservation dies with it.
        assert!(core.conns.is_empty());
        assert!(core.users.is_empty());
        assert!(core.nicks.is_empty(), "nick must not stay squatted");
        let messages = drain(&mut rx);
        assert!(messages.iter().any(|m| m.command == "ERROR"));
    }

    #[test]
    fn netsplit_cascades_to_users_behind_the_link() {
        let mut core = core();
        let (_u0, mut rx0) = register(&mut core, 0, "will");
        send(&mut core, 0, "JOIN #test\r\n");
        let mut link_rx = link_server(&mut core, 10, "2HB", "hub.example.org");
        send(
            &mut core,
            10,
            ":2HB UID toby 1 1700000000 + toby 10.0.0.9 10.0.0.9 2HBAAAAAA :Toby\r\n",
        );
        // A server behind the hub, and a user on it.
        send(&mut core, 10, ":2HB SID leaf.example.org 2 3LF :leaf\r\n");
        send(
            &mut core,
            10,
            ":3LF UID anna 2 1700000000 + anna 10.0.0.7 10.0.0.7 3LFAAAAAA :Anna\r\n",
        );
        send(&mut core, 10, ":2HB SJOIN 1690000000 #test +nt :2HBAAAAAA\r\n");
        drain(&mut rx0);
        drain(&mut link_rx);

        core.handle_event(Event::Dead {
            id: 10,
            reason: "read timeout".into(),
        });

        assert!(core.servers.is_empty());
        assert!(core.users.len() == 1, "only the local user survives");
        assert!(core.nicks.get("toby").is_none());
        assert!(core.nicks.get("anna").is_none());
        // The local member sees the remote user leave.
        let messages = drain(&mut rx0);
        assert!(messages.iter().any(|m| m.command == "QUIT"));
        // The local channel keeps its surviving member only.
        assert_eq!(core.channels.get("#test").unwrap().members.len(), 1);
    }

    #[test]
    fn queue_overflow_drops_only_the_slow_conn() {
        let mut core = core();
        let (_u0, _rx0) = register(&mut core, 0, "will");

        // A user whose writer queue holds a single message.
        let (tx, _slow_rx) = mpsc::channel(1);
        let mut conn = Conn::new(1, addr(), tx);
        let uid: Uid = "1STAAAAAB".parse().unwrap();
        conn.role = Role::User(uid.clone());
        core.conns.insert(1, conn);
        core.users.insert(
            uid.clone(),
            User {
                uid: uid.clone(),
                nick: "slow".into(),
                ident: "slow".into(),
                host: "127.0.0.1".into(),
                ip: "127.0.0.1".into(),
                realname: "Slow".into(),
                hopcount: 0,
                nick_ts: now_ts(),
                modes: BTreeSet::new(),
                channels: Default::default(),
                conn: Some(1),
                link: None,
            },
        );
        core.nicks.insert("slow".into(), NickOwner::User(uid.clone()));

        send(&mut core, 0, "PRIVMSG slow :one\r\n");
        send(&mut core, 0, "PRIVMSG slow :two\r\n");

        // The overflowing connection is swept; the sender is untouched.
        assert!(core.conns.get(&1).is_none());
        assert!(core.users.get(&uid).is_none());
        assert!(core.conns.contains_key(&0));
        assert!(core.users.len() == 1);
    }

    #[test]
    fn oper_login_and_notices() {
        let mut core = core();
        let (uid, mut rx) = register(&mut core, 0, "will");
        send(&mut core, 0, "OPER will hunter2\r\n");
        let messages = drain(&mut rx);
        assert_eq!(messages[0].command, "381");
        assert!(core.users.get(&uid).unwrap().is_oper());

        core.notice_opers("test notice");
        let messages = drain(&mut rx);
        assert_eq!(messages[0].command, "NOTICE");
        assert_eq!(messages[0].params, vec!["will", "test notice"]);
    }

    #[test]
    fn oper_bad_password_gets_464() {
        let mut core = core();
        let (uid, mut rx) = register(&mut core, 0, "will");
        send(&mut core, 0, "OPER will wrong\r\n");
        let messages = drain(&mut rx);
        assert_eq!(messages[0].command, "464");
        assert!(!core.users.get(&uid).unwrap().is_oper());
    }
}
