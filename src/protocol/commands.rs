//! Module `command`
//!
//! Data structures representing parsed FTP commands and the results of
//! executing them.

use std::fmt;

/// Represents an FTP command parsed from the client input.
///
/// Commands that require arguments store them as `String` variants;
/// optional arguments are `Option<String>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    /// Enter passive mode. Any argument is a syntax error, kept for the reply.
    Pasv(Option<String>),
    /// Active mode target, `h1,h2,h3,h4,p1,p2` or `ip:port`.
    Port(Option<String>),
    List(Option<String>),
    Nlst(Option<String>),
    Retr(String),
    Stor(String),
    Abor,
    Noop,
    Quit,
    /// A known command missing its required argument.
    MissingArgument(&'static str),
    /// Unknown or unsupported command.
    Unknown(String),
}

impl Command {
    /// Commands accepted before login.
    pub fn allowed_before_login(&self) -> bool {
        matches!(
            self,
            Command::User(_) | Command::Pass(_) | Command::Quit | Command::Noop
        )
    }
}

/// Renders the command as received, for logging. The PASS argument is
/// masked.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn with_arg(f: &mut fmt::Formatter<'_>, verb: &str, arg: &Option<String>) -> fmt::Result {
            match arg {
                Some(arg) => write!(f, "{verb} {arg}"),
                None => f.write_str(verb),
            }
        }

        match self {
            Command::User(name) => write!(f, "USER {name}"),
            Command::Pass(_) => f.write_str("PASS ****"),
            Command::Pasv(arg) => with_arg(f, "PASV", arg),
            Command::Port(arg) => with_arg(f, "PORT", arg),
            Command::List(arg) => with_arg(f, "LIST", arg),
            Command::Nlst(arg) => with_arg(f, "NLST", arg),
            Command::Retr(path) => write!(f, "RETR {path}"),
            Command::Stor(path) => write!(f, "STOR {path}"),
            Command::Abor => f.write_str("ABOR"),
            Command::Noop => f.write_str("NOOP"),
            Command::Quit => f.write_str("QUIT"),
            Command::MissingArgument(verb) => write!(f, "{verb} (missing argument)"),
            Command::Unknown(verb) => write!(f, "{verb} (unknown)"),
        }
    }
}

/// Represents the outcome status of executing a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Struct encapsulating the full result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(message.into()),
        }
    }

    pub fn failure(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Failure(reason.into()),
            message: Some(message.into()),
        }
    }

    pub fn close(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::CloseConnection,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_masks_password() {
        let shown = Command::Pass("alice123".into()).to_string();
        assert_eq!(shown, "PASS ****");
        assert!(!shown.contains("alice123"));
    }

    #[test]
    fn test_display_keeps_arguments() {
        assert_eq!(Command::User("alice".into()).to_string(), "USER alice");
        assert_eq!(Command::List(None).to_string(), "LIST");
        assert_eq!(
            Command::Port(Some("127,0,0,1,4,1".into())).to_string(),
            "PORT 127,0,0,1,4,1"
        );
    }
}
