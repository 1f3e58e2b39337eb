//! Registration progress for unregistered connections.

use crate::sync::handshake::HandshakeMachine;

/// What a pre-registration connection has told us so far.
///
/// The first credible command commits the connection to one path or the
/// other. A command from the wrong path afterwards is a protocol error
/// and the connection is dropped.
#[derive(Debug, Default)]
pub enum Registration {
    /// Nothing committal seen yet.
    #[default]
    Start,
    /// Client path: NICK and USER in either order.
    UserPath {
        nick: Option<String>,
        user: Option<PreUser>,
    },
    /// Server path: the TS6 handshake.
    ServerPath(HandshakeMachine),
}

/// The USER command's contribution to registration.
#[derive(Debug, Clone)]
pub struct PreUser {
    pub ident: String,
    pub realname: String,
}

impl Registration {
    /// Both halves of the user path are present.
    pub fn user_path_complete(&self) -> bool {
        matches!(
            self,
            Registration::UserPath {
                nick: Some(_),
                user: Some(_),
            }
        )
    }

    /// The nick reserved by this connection, if any.
    pub fn pending_nick(&self) -> Option<&str> {
        match self {
            Registration::UserPath { nick, .. } => nick.as_deref(),
            _ => None,
        }
    }
}
