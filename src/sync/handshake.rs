//! The TS6 link handshake state machine.
//!
//! Both sides exchange PASS, CAPAB, SERVER, and SVINFO. The initiator
//! sends its PASS/CAPAB/SERVER up front; the acceptor validates them
//! and answers with its own triple; the initiator then sends SVINFO and
//! the acceptor answers in kind. After SVINFO both sides burst.
//!
//! The machine consumes the peer's commands one at a time and yields
//! the messages we owe in response. Credential checking happens at
//! SERVER time, once the peer has named itself and we can look up its
//! link block.

use std::collections::HashSet;

use chrono::Utc;
use thiserror::Error;
use tsirc_proto::{Message, Sid};

use crate::config::{Config, LinkBlock};

/// Capabilities we advertise and understand.
pub const LOCAL_CAPABS: &[&str] = &["QS", "ENCAP"];

/// TS protocol version we speak, minimum and current.
pub const TS_VERSION: &str = "6";

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("{0} out of order in link handshake")]
    OutOfOrder(String),

    #[error("not enough parameters for {0}")]
    NeedMoreParams(String),

    #[error("peer sent malformed SID {0:?}")]
    InvalidSid(String),

    #[error("peer wants unsupported TS version {0:?}")]
    UnsupportedTs(String),

    #[error("no link block for server {0:?}")]
    UnknownServer(String),

    #[error("link password mismatch for {0}")]
    BadCredentials(String),

    #[error("server {0} announced SID {1} but the link block requires {2}")]
    SidMismatch(String, String, String),

    #[error("malformed SVINFO: {0}")]
    InvalidSvinfo(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    ExpectPass,
    ExpectCapab,
    ExpectServer,
    ExpectSvinfo,
    Done,
}

/// One message's worth of progress through the handshake.
#[derive(Debug)]
pub struct StepOutcome {
    /// Messages to send to the peer.
    pub replies: Vec<Message>,
    /// The handshake finished; promote the connection to a link.
    pub complete: bool,
}

/// Handshake progress for one not-yet-established link.
#[derive(Debug)]
pub struct HandshakeMachine {
    state: HandshakeState,
    /// We dialed this peer and already sent our PASS/CAPAB/SERVER.
    outbound: bool,
    pass: Option<String>,
    pub sid: Option<Sid>,
    pub capabs: HashSet<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl HandshakeMachine {
    /// Machine for a peer that connected to us.
    pub fn inbound() -> Self {
        Self::new(false)
    }

    /// Machine for a peer we dialed.
    pub fn outbound() -> Self {
        Self::new(true)
    }

    fn new(outbound: bool) -> Self {
        Self {
            state: HandshakeState::ExpectPass,
            outbound,
            pass: None,
            sid: None,
            capabs: HashSet::new(),
            name: None,
            description: None,
        }
    }

    /// Advance the handshake with one message from the peer.
    ///
    /// Any error is fatal to the connection.
    pub fn step(&mut self, message: &Message, config: &Config) -> Result<StepOutcome, HandshakeError> {
        match (self.state, message.command.as_str()) {
            (HandshakeState::ExpectPass, "PASS") => self.on_pass(message),
            (HandshakeState::ExpectCapab, "CAPAB") => self.on_capab(message),
            (HandshakeState::ExpectServer, "SERVER") => self.on_server(message, config),
            (HandshakeState::ExpectSvinfo, "SVINFO") => self.on_svinfo(message),
            (_, other) => Err(HandshakeError::OutOfOrder(other.to_string())),
        }
    }

    // PASS <password> TS <version> <sid>
    fn on_pass(&mut self, message: &Message) -> Result<StepOutcome, HandshakeError> {
        if message.params.len() < 4 {
            return Err(HandshakeError::NeedMoreParams("PASS".into()));
        }
        if message.params[1] != "TS" || message.params[2] != TS_VERSION {
            return Err(HandshakeError::UnsupportedTs(format!(
                "{} {}",
                message.params[1], message.params[2]
            )));
        }
        let sid: Sid = message.params[3]
            .parse()
            .map_err(|_| HandshakeError::InvalidSid(message.params[3].clone()))?;
        self.pass = Some(message.params[0].clone());
        self.sid = Some(sid);
        self.state = HandshakeState::ExpectCapab;
        Ok(StepOutcome {
            replies: vec![],
            complete: false,
        })
    }

    // CAPAB :<space separated tokens>
    fn on_capab(&mut self, message: &Message) -> Result<StepOutcome, HandshakeError> {
        if message.params.is_empty() {
            return Err(HandshakeError::NeedMoreParams("CAPAB".into()));
        }
        self.capabs = message.params[0]
            .split_whitespace()
            .filter(|t| LOCAL_CAPABS.contains(t))
            .map(|t| t.to_string())
            .collect();
        self.state = HandshakeState::ExpectServer;
        Ok(StepOutcome {
            replies: vec![],
            complete: false,
        })
    }

    // SERVER <name> <hopcount> <description>
    fn on_server(&mut self, message: &Message, config: &Config) -> Result<StepOutcome, HandshakeError> {
        if message.params.len() < 3 {
            return Err(HandshakeError::NeedMoreParams("SERVER".into()));
        }
        let name = &message.params[0];
        let link = config
            .link_for(name)
            .ok_or_else(|| HandshakeError::UnknownServer(name.clone()))?;
        let offered = self.pass.as_deref().unwrap_or_default();
        if offered != link.password {
            return Err(HandshakeError::BadCredentials(name.clone()));
        }
        if let (Some(expected), Some(got)) = (&link.sid, &self.sid) {
            if expected != got.as_str() {
                return Err(HandshakeError::SidMismatch(
                    name.clone(),
                    got.to_string(),
                    expected.clone(),
                ));
            }
        }
        self.name = Some(name.clone());
        self.description = Some(message.params[2].clone());
        self.state = HandshakeState::ExpectSvinfo;

        // The acceptor owes its own triple; the initiator, having sent
        // its triple at connect time, owes SVINFO.
        let replies = if self.outbound {
            vec![svinfo_message()]
        } else {
            opening_messages(config, link)
        };
        Ok(StepOutcome {
            replies,
            complete: false,
        })
    }

    // SVINFO <current> <min> 0 <time>
    fn on_svinfo(&mut self, message: &Message) -> Result<StepOutcome, HandshakeError> {
        if message.params.len() < 4 {
            return Err(HandshakeError::NeedMoreParams("SVINFO".into()));
        }
        let current: u32 = message.params[0]
            .parse()
            .map_err(|_| HandshakeError::InvalidSvinfo(message.params[0].clone()))?;
        let min: u32 = message.params[1]
            .parse()
            .map_err(|_| HandshakeError::InvalidSvinfo(message.params[1].clone()))?;
        if min > 6 || current < 6 {
            return Err(HandshakeError::UnsupportedTs(format!("{}/{}", current, min)));
        }
        self.state = HandshakeState::Done;
        let replies = if self.outbound {
            vec![]
        } else {
            vec![svinfo_message()]
        };
        Ok(StepOutcome {
            replies,
            complete: true,
        })
    }
}

/// The PASS/CAPAB/SERVER triple announcing ourselves over `link`.
pub fn opening_messages(config: &Config, link: &LinkBlock) -> Vec<Message> {
    vec![
        Message::new(
            "PASS",
            vec![
                link.password.clone(),
                "TS".to_string(),
                TS_VERSION.to_string(),
                config.server.sid.clone(),
            ],
        ),
        Message::new("CAPAB", vec![LOCAL_CAPABS.join(" ")]),
        Message::new(
            "SERVER",
            vec![
                config.server.name.clone(),
                "1".to_string(),
                config.server.description.clone(),
            ],
        ),
    ]
}

/// Our SVINFO: TS6 only, with the current time for sanity checking.
pub fn svinfo_message() -> Message {
    Message::new(
        "SVINFO",
        vec![
            TS_VERSION.to_string(),
            TS_VERSION.to_string(),
            "0".to_string(),
            Utc::now().timestamp().to_string(),
        ],
    )
}
