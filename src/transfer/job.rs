//! In-flight transfer description
//!
//! A [`Transfer`] is one data movement attached to a logical session: its
//! kind, the precomputed lines for list-like transfers, the file source for
//! retrieve-like transfers, and its status.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TransferError;
use crate::transfer::data_channel::DataConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Data pushed by the peer (STOR).
    Store,
    /// Data pushed by the server (RETR).
    Retrieve,
    /// Precomputed text lines (LIST, NLST).
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Created,
    Running,
    Finished,
}

/// Starts pushing a file over the data connection.
///
/// Implementations return `NoSuchFile` synchronously when there is nothing
/// to send, otherwise spawn the push and resolve the data signal when done.
pub trait RetrieveSource: Send + Sync + fmt::Debug {
    fn start_retrieve(&self, data: &Arc<DataConnection>) -> Result<(), TransferError>;
}

#[derive(Debug)]
pub struct Transfer {
    kind: TransferKind,
    path: String,
    info: Vec<String>,
    source: Option<Arc<dyn RetrieveSource>>,
    status: Mutex<Option<bool>>,
    state: Mutex<TransferState>,
}

impl Transfer {
    fn new(kind: TransferKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            info: Vec::new(),
            source: None,
            status: Mutex::new(None),
            state: Mutex::new(TransferState::Created),
        }
    }

    pub fn store(path: impl Into<String>) -> Self {
        Self::new(TransferKind::Store, path)
    }

    pub fn retrieve(path: impl Into<String>, source: Arc<dyn RetrieveSource>) -> Self {
        Self {
            source: Some(source),
            ..Self::new(TransferKind::Retrieve, path)
        }
    }

    pub fn list(path: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            info: lines,
            ..Self::new(TransferKind::List, path)
        }
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn info(&self) -> &[String] {
        &self.info
    }

    pub fn source(&self) -> Option<&Arc<dyn RetrieveSource>> {
        self.source.as_ref()
    }

    /// `None` until the transfer settled.
    pub fn status(&self) -> Option<bool> {
        *self.status.lock()
    }

    pub fn set_status(&self, status: bool) {
        *self.status.lock() = Some(status);
    }

    pub fn state(&self) -> TransferState {
        *self.state.lock()
    }

    pub fn mark_running(&self) {
        let mut state = self.state.lock();
        if *state == TransferState::Created {
            *state = TransferState::Running;
        }
    }

    /// Marks the transfer finished, keeping an explicitly set status.
    pub fn finish(&self, success: bool) {
        *self.state.lock() = TransferState::Finished;
        self.status.lock().get_or_insert(success);
    }

    /// Neither finished nor untouched.
    pub fn is_active(&self) -> bool {
        self.state() == TransferState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TransferState::Finished
    }
}

/// Serializes list-like lines, CRLF after each; a lone CRLF when empty.
pub fn render_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        return "\r\n".to_string();
    }
    let mut message = String::with_capacity(lines.iter().map(|l| l.len() + 2).sum());
    for line in lines {
        message.push_str(line);
        message.push_str("\r\n");
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lines() {
        let lines = vec!["a.txt".to_string(), "b/".to_string()];
        assert_eq!(render_lines(&lines), "a.txt\r\nb/\r\n");
        assert_eq!(render_lines(&[]), "\r\n");
    }

    #[test]
    fn test_state_transitions() {
        let transfer = Transfer::store("upload.bin");
        assert_eq!(transfer.state(), TransferState::Created);
        assert!(!transfer.is_active());

        transfer.mark_running();
        assert!(transfer.is_active());

        transfer.finish(true);
        assert!(transfer.is_finished());
        assert!(!transfer.is_active());
        assert_eq!(transfer.status(), Some(true));
    }

    #[test]
    fn test_finish_keeps_explicit_status() {
        let transfer = Transfer::list("/", vec![]);
        transfer.set_status(false);
        transfer.finish(true);
        assert_eq!(transfer.status(), Some(false));
    }
}
