//! FTP Response handling
//!
//! Defines FTP response codes, formatting, and the shared sink replies are
//! written to. Transfer workers reply on the same control connection as
//! the command loop, so writes go through one lock.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Standard FTP response codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ReplyCode {
    FileStatusOkay = 150,
    CommandOkay = 200,
    ServiceReady = 220,
    ClosingControlConnection = 221,
    TransferComplete = 226,
    EnteringPassiveMode = 227,
    LoginSuccessful = 230,
    PasswordRequired = 331,
    ServiceNotAvailable = 421,
    CannotOpenDataConnection = 425,
    TransferAborted = 426,
    FileActionNotTaken = 450,
    LocalError = 451,
    SyntaxError = 500,
    SyntaxErrorInParameters = 501,
    NotImplemented = 502,
    BadSequence = 503,
    NotLoggedIn = 530,
    FileUnavailable = 550,
}

impl ReplyCode {
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Format an FTP response message
pub fn format_response(code: ReplyCode, message: &str) -> String {
    format!("{} {}\r\n", code.code(), message)
}

pub type ControlWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write side of a control connection, shared between the command loop and
/// the transfer reply workers.
#[derive(Clone)]
pub struct ReplySink {
    writer: Arc<Mutex<ControlWriter>>,
}

impl ReplySink {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Writes one complete reply and flushes it.
    pub async fn send(&self, reply: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(reply.as_bytes()).await?;
        writer.flush().await
    }

    pub async fn shutdown(&self) -> io::Result<()> {
        self.writer.lock().await.shutdown().await
    }
}
