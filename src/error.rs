//! Command handler errors and their numeric replies.

use thiserror::Error;

pub type HandlerResult = Result<(), HandlerError>;

/// Failure modes of command handlers.
///
/// Most variants map to a numeric reply and leave the connection up.
/// [`HandlerError::Quit`] is the exception: it tears the connection
/// down, which for a server link means a netsplit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("no such nick {0}")]
    NoSuchNick(String),

    #[error("no such server {0}")]
    NoSuchServer(String),

    #[error("no such channel {0}")]
    NoSuchChannel(String, &'static str),

    #[error("no recipient for {0}")]
    NoRecipient(String),

    #[error("no text to send")]
    NoTextToSend,

    #[error("unknown command {0}")]
    UnknownCommand(String),

    #[error("erroneous nickname {0}")]
    ErroneousNickname(String),

    #[error("nickname {0} in use")]
    NicknameInUse(String),

    #[error("not registered")]
    NotRegistered,

    #[error("not enough parameters for {0}")]
    NeedMoreParams(String),

    #[error("password mismatch")]
    PasswdMismatch,

    /// Fatal. The connection is dropped with this reason.
    #[error("{0}")]
    Quit(String),
}

impl HandlerError {
    /// The numeric reply for this error, as `(code, params)` without
    /// the leading target nick. `None` for fatal errors.
    pub fn numeric(&self) -> Option<(&'static str, Vec<String>)> {
        match self {
            // 401 ERR_NOSUCHNICK
            Self::NoSuchNick(nick) => Some((
                "401",
                vec![nick.clone(), "No such nick/channel".to_string()],
            )),
            // 402 ERR_NOSUCHSERVER
            Self::NoSuchServer(name) => {
                Some(("402", vec![name.clone(), "No such server".to_string()]))
            }
            // 403 ERR_NOSUCHCHANNEL
            Self::NoSuchChannel(name, text) => Some(("403", vec![name.clone(), text.to_string()])),
            // 411 ERR_NORECIPIENT
            Self::NoRecipient(cmd) => Some((
                "411",
                vec![format!("No recipient given ({})", cmd)],
            )),
            // 412 ERR_NOTEXTTOSEND
            Self::NoTextToSend => Some(("412", vec!["No text to send".to_string()])),
            // 421 ERR_UNKNOWNCOMMAND
            Self::UnknownCommand(cmd) => {
                Some(("421", vec![cmd.clone(), "Unknown command".to_string()]))
            }
            // 432 ERR_ERRONEUSNICKNAME
            Self::ErroneousNickname(nick) => Some((
                "432",
                vec![nick.clone(), "Erroneous nickname".to_string()],
            )),
            // 433 ERR_NICKNAMEINUSE
            Self::NicknameInUse(nick) => Some((
                "433",
                vec![nick.clone(), "Nickname is already in use".to_string()],
            )),
            // 451 ERR_NOTREGISTERED
            Self::NotRegistered => Some(("451", vec!["You have not registered".to_string()])),
            // 461 ERR_NEEDMOREPARAMS
            Self::NeedMoreParams(cmd) => Some((
                "461",
                vec![cmd.clone(), "Not enough parameters".to_string()],
            )),
            // 464 ERR_PASSWDMISMATCH
            Self::PasswdMismatch => Some(("464", vec!["Password incorrect".to_string()])),
            Self::Quit(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerics() {
        let (code, params) = HandlerError::NeedMoreParams("USER".into()).numeric().unwrap();
        assert_eq!(code, "461");
        assert_eq!(params[0], "USER");

        let (code, _) = HandlerError::NicknameInUse("will".into()).numeric().unwrap();
        assert_eq!(code, "433");

        assert!(HandlerError::Quit("bye".into()).numeric().is_none());
    }
}
