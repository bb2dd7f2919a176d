//! FTP Command parsing
//!
//! Turns a raw control line into a [`Command`].

use crate::protocol::commands::Command;

/// Parses a raw command line received from a client.
///
/// Verbs are case-insensitive; known commands used without a required
/// argument become [`Command::MissingArgument`].
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg = parts
        .next()
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(str::to_string);

    match (verb.as_str(), arg) {
        ("USER", Some(arg)) => Command::User(arg),
        ("PASS", Some(arg)) => Command::Pass(arg),
        ("RETR", Some(arg)) => Command::Retr(arg),
        ("STOR", Some(arg)) => Command::Stor(arg),
        ("USER", None) => Command::MissingArgument("USER"),
        ("PASS", None) => Command::MissingArgument("PASS"),
        ("RETR", None) => Command::MissingArgument("RETR"),
        ("STOR", None) => Command::MissingArgument("STOR"),
        ("PASV", arg) => Command::Pasv(arg),
        ("PORT", arg) => Command::Port(arg),
        ("LIST", arg) => Command::List(arg),
        ("NLST", arg) => Command::Nlst(arg),
        ("ABOR", _) => Command::Abor,
        ("NOOP", _) => Command::Noop,
        ("QUIT", _) => Command::Quit,
        _ => Command::Unknown(verb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(parse_command("USER alice\r\n"), Command::User("alice".into()));
        assert_eq!(parse_command("pass secret"), Command::Pass("secret".into()));
        assert_eq!(parse_command("QUIT"), Command::Quit);
        assert_eq!(parse_command("noop"), Command::Noop);
        assert_eq!(parse_command("ABOR"), Command::Abor);
    }

    #[test]
    fn test_parse_optional_arguments() {
        assert_eq!(parse_command("PASV"), Command::Pasv(None));
        assert_eq!(parse_command("PASV 1,2"), Command::Pasv(Some("1,2".into())));
        assert_eq!(parse_command("PORT"), Command::Port(None));
        assert_eq!(
            parse_command("PORT 127,0,0,1,4,1"),
            Command::Port(Some("127,0,0,1,4,1".into()))
        );
        assert_eq!(parse_command("LIST"), Command::List(None));
        assert_eq!(parse_command("NLST /docs"), Command::Nlst(Some("/docs".into())));
    }

    #[test]
    fn test_missing_and_unknown() {
        assert_eq!(parse_command("RETR"), Command::MissingArgument("RETR"));
        assert_eq!(parse_command("STOR   "), Command::MissingArgument("STOR"));
        assert_eq!(parse_command("SITE CHMOD"), Command::Unknown("SITE".into()));
        assert_eq!(parse_command(""), Command::Unknown(String::new()));
    }

    #[test]
    fn test_file_names_keep_spaces() {
        assert_eq!(
            parse_command("RETR my file.txt"),
            Command::Retr("my file.txt".into())
        );
    }
}
