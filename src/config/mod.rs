//! TOML configuration loading.
//!
//! The daemon takes a single config file. A minimal one looks like:
//!
//! ```toml
//! [server]
//! name = "irc.example.org"
//! sid = "1ST"
//! description = "example server"
//!
//! [listen]
//! address = "0.0.0.0:6667"
//!
//! [[opers]]
//! name = "will"
//! password = "hunter2"
//!
//! [[links]]
//! name = "hub.example.org"
//! hostname = "10.0.0.2"
//! port = 7000
//! password = "linkpass"
//! autoconnect = true
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tsirc_proto::Sid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub listen: ListenConfig,
    #[serde(default)]
    pub opers: Vec<OperBlock>,
    #[serde(default)]
    pub links: Vec<LinkBlock>,
    #[serde(default)]
    pub motd: MotdConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// This server's name as shown to clients and peers.
    pub name: String,
    /// This server's TS6 SID.
    pub sid: String,
    /// Free-form description sent in SERVER commands.
    pub description: String,
    #[serde(default = "default_max_nick_length")]
    pub max_nick_length: usize,
    /// Seconds of read silence after which a connection is dead.
    #[serde(default = "default_dead_time_secs")]
    pub dead_time_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    pub address: SocketAddr,
}

/// An operator account usable with OPER.
#[derive(Debug, Clone, Deserialize)]
pub struct OperBlock {
    pub name: String,
    pub password: String,
}

/// A peer server we may link with, inbound or outbound.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkBlock {
    /// The peer's server name, matched against its SERVER command.
    pub name: String,
    pub hostname: String,
    pub port: u16,
    /// Shared link password, sent and expected in PASS.
    pub password: String,
    /// Dial this peer at startup.
    #[serde(default)]
    pub autoconnect: bool,
    /// If set, the peer's SID must match.
    #[serde(default)]
    pub sid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MotdConfig {
    #[serde(default)]
    pub lines: Vec<String>,
}

fn default_max_nick_length() -> usize {
    15
}

fn default_dead_time_secs() -> u64 {
    300
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.is_empty() {
            return Err(ConfigError::Invalid("server.name must be set".into()));
        }
        if self.server.sid.parse::<Sid>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "server.sid {:?} is not a valid SID",
                self.server.sid
            )));
        }
        for link in &self.links {
            if let Some(sid) = &link.sid {
                if sid.parse::<Sid>().is_err() {
                    return Err(ConfigError::Invalid(format!(
                        "link {:?} has invalid sid {:?}",
                        link.name, sid
                    )));
                }
            }
        }
        Ok(())
    }

    /// Find the link block for a peer by server name.
    pub fn link_for(&self, name: &str) -> Option<&LinkBlock> {
        self.links.iter().find(|l| l.name == name)
    }
}
