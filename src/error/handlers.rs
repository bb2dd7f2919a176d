//! Error handlers
//!
//! Maps errors onto FTP reply codes and formatted replies.

use log::{error, warn};

use crate::error::types::{
    AuthError, ConnectionError, ErrorKind, FtpServerError, StorageError, TransferError,
};
use crate::protocol::responses::{ReplyCode, format_response};

/// Log an FTP server error at a level matching its kind
pub fn handle_error(err: &FtpServerError) {
    match err.kind() {
        ErrorKind::Internal => error!("FTP Server Error: {}", err),
        _ => warn!("FTP Server Error: {}", err),
    }
}

/// Convert error to FTP response code
pub fn error_to_ftp_code(err: &FtpServerError) -> ReplyCode {
    match err {
        FtpServerError::Auth(AuthError::MalformedInput(_)) => ReplyCode::SyntaxErrorInParameters,
        FtpServerError::Auth(AuthError::UserRequired) => ReplyCode::BadSequence,
        FtpServerError::Auth(_) => ReplyCode::NotLoggedIn,
        FtpServerError::Storage(StorageError::PathTraversal(_)) => {
            ReplyCode::SyntaxErrorInParameters
        }
        FtpServerError::Storage(_) => ReplyCode::FileUnavailable,
        FtpServerError::Transfer(e) => transfer_error_code(e),
        FtpServerError::Connection(ConnectionError::Closing) => ReplyCode::ServiceNotAvailable,
        FtpServerError::Connection(ConnectionError::SessionClosed(_)) => {
            ReplyCode::CannotOpenDataConnection
        }
        FtpServerError::Config(_) | FtpServerError::InvalidConfig(_) => ReplyCode::LocalError,
        FtpServerError::IoError(_) => ReplyCode::LocalError,
    }
}

fn transfer_error_code(err: &TransferError) -> ReplyCode {
    match err {
        TransferError::PassiveNotAllowed
        | TransferError::ActiveNotAllowed
        | TransferError::UnexpectedArgument
        | TransferError::InvalidAddress(_)
        | TransferError::AddressMismatch { .. } => ReplyCode::SyntaxErrorInParameters,
        TransferError::NoPortAvailable { .. }
        | TransferError::UnsupportedAddress(_)
        | TransferError::DataChannelNotInitialized
        | TransferError::DataConnectionFailed(_) => ReplyCode::CannotOpenDataConnection,
        TransferError::NoSuchFile(_) => ReplyCode::FileUnavailable,
        TransferError::TransferInProgress => ReplyCode::FileActionNotTaken,
        TransferError::Shutdown => ReplyCode::ServiceNotAvailable,
        TransferError::Io(_) => ReplyCode::TransferAborted,
    }
}

/// Formats the reply sent to the peer for an error.
///
/// Transfer errors carry the exact wording peers expect; the other kinds
/// use their display text.
pub fn error_reply(err: &FtpServerError) -> String {
    let code = error_to_ftp_code(err);
    match err {
        FtpServerError::Transfer(e) => format_response(code, &e.to_string()),
        FtpServerError::Auth(AuthError::NotLoggedIn) => format_response(code, "Not logged in"),
        FtpServerError::Auth(AuthError::UserRequired) => {
            format_response(code, "Please enter the username first")
        }
        FtpServerError::Auth(_) => format_response(code, "Login incorrect"),
        FtpServerError::Connection(ConnectionError::Closing) => {
            format_response(code, "Service closing control connection")
        }
        _ => format_response(code, "Requested action not taken"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_errors_map_to_reply_codes() {
        let syntax: FtpServerError = TransferError::UnexpectedArgument.into();
        assert_eq!(error_to_ftp_code(&syntax).code(), 501);

        let exhausted: FtpServerError = TransferError::NoPortAvailable { attempts: 3 }.into();
        assert_eq!(error_to_ftp_code(&exhausted).code(), 425);
        assert_eq!(error_reply(&exhausted), "425 No port available\r\n");

        let closing: FtpServerError = ConnectionError::Closing.into();
        assert_eq!(error_to_ftp_code(&closing).code(), 421);
    }

    #[test]
    fn test_not_allowed_reply() {
        let err: FtpServerError = TransferError::PassiveNotAllowed.into();
        assert_eq!(error_reply(&err), "501 Passive mode not allowed\r\n");
    }

    #[test]
    fn test_auth_replies() {
        let err: FtpServerError = AuthError::NotLoggedIn.into();
        assert_eq!(error_reply(&err), "530 Not logged in\r\n");
    }
}
