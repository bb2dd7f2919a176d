//! Error handling
//!
//! Typed errors for every layer of the server, their classification into
//! protocol, connectivity, shutdown and internal faults, and the mapping
//! of each one onto an FTP reply code.

pub mod handlers;
pub mod types;

pub use handlers::{error_reply, error_to_ftp_code, handle_error};
pub use types::{
    AuthError, ConnectionError, ErrorKind, FtpServerError, StorageError, TransferError,
};
