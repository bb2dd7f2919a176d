//! Transfer result types
//!
//! Defines result structures returned by negotiation and transfer operations.

use std::net::SocketAddr;

/// Result of setting up passive mode
#[derive(Debug, Clone)]
pub struct PassiveModeResult {
    pub local_addr: SocketAddr,
    pub reply: String,
}

/// Result of setting up active mode (PORT command)
#[derive(Debug, Clone)]
pub struct ActiveModeResult {
    pub target: SocketAddr,
    pub reply: String,
}

/// How a data movement, or the transfer driving it, ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Failed,
    /// Retrieve-like transfer whose file does not exist.
    FileUnavailable,
    /// Resolved externally by ABOR or a reset data connection.
    Aborted,
    /// Forced by connection teardown.
    Shutdown,
    TimedOut,
    /// The waiting worker was cancelled before the data layer answered.
    Interrupted,
}

impl TransferOutcome {
    pub fn is_success(self) -> bool {
        self == TransferOutcome::Success
    }
}
