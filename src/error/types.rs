//! Error types
//!
//! Defines domain-specific error types for each module of the FTP server,
//! together with the coarse [`ErrorKind`] taxonomy used to decide how an
//! error is surfaced and whether it may be retried.

use std::io;
use std::net::IpAddr;

use thiserror::Error;

/// Coarse classification shared by every error of the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or disallowed arguments. Reported to the peer, never retried.
    ProtocolSyntax,
    /// Port exhaustion, refused modes, spoofed addresses, broken data links.
    Connectivity,
    /// Forced resolution during connection teardown. Always terminal.
    Shutdown,
    /// Broken internal invariants. Logged and resolved locally.
    Internal,
}

/// Authentication module errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),
    #[error("Invalid password for user: {0}")]
    InvalidPassword(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Please enter the username first")]
    UserRequired,
    #[error("Not logged in")]
    NotLoggedIn,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::MalformedInput(_) => ErrorKind::ProtocolSyntax,
            _ => ErrorKind::Connectivity,
        }
    }
}

/// Storage module errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Transfer module errors: data-connection negotiation and transfer execution.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Passive mode not allowed")]
    PassiveNotAllowed,
    #[error("Active mode not allowed")]
    ActiveNotAllowed,
    #[error("No argument allowed")]
    UnexpectedArgument,
    #[error("Need correct Inet Address as argument")]
    InvalidAddress(String),
    #[error("Given Inet Address mismatches actual client Address")]
    AddressMismatch { expected: IpAddr, provided: IpAddr },
    #[error("No port available")]
    NoPortAvailable { attempts: u32 },
    #[error("Passive mode needs an IPv4 address, got {0}")]
    UnsupportedAddress(IpAddr),
    #[error("Data channel not initialized")]
    DataChannelNotInitialized,
    #[error("Data connection failed: {0}")]
    DataConnectionFailed(String),
    #[error("No such file: {0}")]
    NoSuchFile(String),
    #[error("A transfer is already in progress")]
    TransferInProgress,
    #[error("Session is shutting down")]
    Shutdown,
    #[error("Transfer failed: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::UnexpectedArgument
            | TransferError::InvalidAddress(_)
            | TransferError::TransferInProgress => ErrorKind::ProtocolSyntax,
            TransferError::PassiveNotAllowed
            | TransferError::ActiveNotAllowed
            | TransferError::AddressMismatch { .. }
            | TransferError::NoPortAvailable { .. }
            | TransferError::UnsupportedAddress(_)
            | TransferError::DataChannelNotInitialized
            | TransferError::DataConnectionFailed(_)
            | TransferError::Io(_) => ErrorKind::Connectivity,
            TransferError::Shutdown => ErrorKind::Shutdown,
            TransferError::NoSuchFile(_) => ErrorKind::Internal,
        }
    }
}

/// Transport connection errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection is closing")]
    Closing,
    #[error("Session {0} is already closed")]
    SessionClosed(u64),
}

impl ConnectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectionError::Closing => ErrorKind::Shutdown,
            ConnectionError::SessionClosed(_) => ErrorKind::Internal,
        }
    }
}

/// General FTP server error that encompasses all error types
#[derive(Debug, Error)]
pub enum FtpServerError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl FtpServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FtpServerError::Auth(e) => e.kind(),
            FtpServerError::Storage(StorageError::PathTraversal(_)) => ErrorKind::ProtocolSyntax,
            FtpServerError::Storage(_) => ErrorKind::Internal,
            FtpServerError::Transfer(e) => e.kind(),
            FtpServerError::Connection(e) => e.kind(),
            FtpServerError::Config(_) | FtpServerError::InvalidConfig(_) => ErrorKind::Internal,
            FtpServerError::IoError(_) => ErrorKind::Connectivity,
        }
    }
}
