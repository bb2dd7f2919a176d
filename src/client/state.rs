//! Module `state`
//!
//! Control-connection login state and the completion states of logical
//! sessions.

use std::net::SocketAddr;

/// Completion state of a logical session as seen by the connection owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Pending,
    /// The session's request was accepted; work is in progress.
    Validated,
    /// The request was rejected but the session is not finished yet.
    ValidationFailed,
    Done,
    Failed,
}

impl CompletionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CompletionState::Done | CompletionState::Failed)
    }
}

/// Final result recorded on a logical session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Success,
    Failed,
    Shutdown,
}

/// Represents the login state of a control connection.
///
/// Tracks authentication status and the peer address of the connection.
#[derive(Debug)]
pub struct ControlState {
    username: Option<String>,
    peer_addr: SocketAddr,
    is_user_valid: bool,
    is_logged_in: bool,
}

impl ControlState {
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            username: None,
            peer_addr,
            is_user_valid: false,
            is_logged_in: false,
        }
    }

    /// Resets the login state, keeping only the peer address.
    pub fn logout(&mut self) {
        self.username = None;
        self.is_user_valid = false;
        self.is_logged_in = false;
    }

    /// Returns whether the USER command was accepted.
    pub fn is_user_valid(&self) -> bool {
        self.is_user_valid
    }

    /// Returns whether the client has successfully logged in.
    pub fn is_logged_in(&self) -> bool {
        self.is_logged_in
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Records the outcome of USER validation.
    pub fn set_user(&mut self, username: Option<String>) {
        self.is_user_valid = username.is_some();
        self.is_logged_in = false;
        self.username = username;
    }

    /// Sets the login state of the client.
    ///
    /// Typically set after successful PASS command validation.
    pub fn set_logged_in(&mut self, logged_in: bool) {
        self.is_logged_in = logged_in;
    }
}
