//! Module `data_channel`
//!
//! Per-session data connection state and the acceptor that turns a
//! negotiated passive or active setup into an open data stream.
//!
//! A passive listener only hands its inbound connection to the session that
//! negotiated it: the peer is correlated through the
//! [`PendingSessionRegistry`] by `(peer ip, local bound address)`, and any
//! other inbound connection is dropped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use crate::client::LogicalSession;
use crate::error::TransferError;
use crate::transfer::channel_registry::PendingSessionRegistry;
use crate::transfer::modes::DataMode;
use crate::transfer::results::TransferOutcome;
use crate::transfer::signal::CompletionSignal;

/// Anything a transfer can move bytes over.
pub trait DataStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> DataStream for T {}

pub type BoxedDataStream = Box<dyn DataStream>;

/// The two one-shot signals of the current transfer.
#[derive(Debug, Clone)]
struct TransferSignals {
    /// Resolved by the data layer once bytes stopped moving.
    data: CompletionSignal<TransferOutcome>,
    /// Resolved by the coordinator once the transfer is over.
    end_of_transfer: CompletionSignal<TransferOutcome>,
}

impl TransferSignals {
    fn new() -> Self {
        Self {
            data: CompletionSignal::new("data connection"),
            end_of_transfer: CompletionSignal::new("end of transfer"),
        }
    }
}

/// Data path of one logical session.
pub struct DataConnection {
    mode: Mutex<DataMode>,
    listener: Mutex<Option<TcpListener>>,
    stream: tokio::sync::Mutex<Option<BoxedDataStream>>,
    signals: Mutex<TransferSignals>,
}

impl std::fmt::Debug for DataConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataConnection")
            .field("mode", &*self.mode.lock())
            .finish_non_exhaustive()
    }
}

impl Default for DataConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl DataConnection {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(DataMode::None),
            listener: Mutex::new(None),
            stream: tokio::sync::Mutex::new(None),
            signals: Mutex::new(TransferSignals::new()),
        }
    }

    pub fn mode(&self) -> DataMode {
        *self.mode.lock()
    }

    pub fn is_passive(&self) -> bool {
        matches!(self.mode(), DataMode::Passive { .. })
    }

    /// Installs a freshly bound passive listener, replacing any previous setup.
    pub fn set_passive(&self, listener: TcpListener, local: SocketAddr) {
        *self.listener.lock() = Some(listener);
        *self.mode.lock() = DataMode::Passive { local };
    }

    /// Records the active-mode destination. No connection is attempted yet.
    pub fn set_active(&self, target: SocketAddr) {
        self.listener.lock().take();
        *self.mode.lock() = DataMode::Active { target };
    }

    /// Forgets the negotiated mode and drops any listener.
    pub fn clear(&self) {
        self.listener.lock().take();
        *self.mode.lock() = DataMode::None;
    }

    fn take_listener(&self) -> Option<TcpListener> {
        self.listener.lock().take()
    }

    /// Resets the data-completion signal to "not yet opened".
    pub fn prime(&self) {
        self.signals.lock().data = CompletionSignal::new("data connection");
    }

    /// Fresh signals for a transfer about to start.
    pub(crate) fn prime_transfer(&self) {
        *self.signals.lock() = TransferSignals::new();
    }

    pub fn data_signal(&self) -> CompletionSignal<TransferOutcome> {
        self.signals.lock().data.clone()
    }

    pub fn end_of_transfer_signal(&self) -> CompletionSignal<TransferOutcome> {
        self.signals.lock().end_of_transfer.clone()
    }

    /// Called by the data layer (or an abort) when data stopped moving.
    pub fn resolve(&self, outcome: TransferOutcome) -> bool {
        self.data_signal().resolve(outcome)
    }

    /// Signals end of transfer. Exactly one call per transfer succeeds.
    pub fn set_end_of_transfer(&self, outcome: TransferOutcome) -> bool {
        self.end_of_transfer_signal().resolve(outcome)
    }

    pub async fn attach_stream(&self, stream: BoxedDataStream) {
        *self.stream.lock().await = Some(stream);
    }

    pub async fn take_stream(&self) -> Option<BoxedDataStream> {
        self.stream.lock().await.take()
    }

    pub async fn has_stream(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Writes an already rendered message and closes the data stream.
    /// Returns whether every byte was written.
    pub async fn write_message(&self, message: &str) -> bool {
        let Some(mut stream) = self.take_stream().await else {
            error!("No data connection but a message must be written");
            return false;
        };
        let written = match stream.write_all(message.as_bytes()).await {
            Ok(()) => stream.flush().await.is_ok(),
            Err(e) => {
                error!("Failed to write on data connection: {e}");
                false
            }
        };
        let _ = stream.shutdown().await;
        written
    }

    /// Closes a data stream nothing consumed, so the peer sees EOF.
    pub async fn shutdown_stream(&self) {
        if let Some(mut stream) = self.take_stream().await {
            debug!("Closing unused data stream");
            let _ = stream.shutdown().await;
        }
    }

    /// Tears the data path down and wakes any waiter with `Shutdown`.
    pub fn close(&self) {
        self.listener.lock().take();
        if let Ok(mut stream) = self.stream.try_lock() {
            stream.take();
        }
        let signals = self.signals.lock().clone();
        signals.data.try_resolve(TransferOutcome::Shutdown);
    }
}

/// Opens the data stream for `session` according to its negotiated mode
/// and stores it in the session's [`DataConnection`].
///
/// Gives up with [`TransferError::Shutdown`] as soon as the session is
/// closed, without waiting out `timeout`.
pub async fn open_data_stream(
    session: &Arc<LogicalSession>,
    registry: &PendingSessionRegistry,
    timeout: Duration,
) -> Result<(), TransferError> {
    let data = session.data();
    let opened = tokio::select! {
        biased;
        _ = session.cancelled() => {
            info!("Session {} closed while opening its data connection", session.id());
            Err(TransferError::Shutdown)
        }
        opened = connect_or_accept(session, registry, timeout) => opened,
    };

    match opened {
        Ok(stream) => {
            data.attach_stream(stream).await;
            Ok(())
        }
        Err(e) => {
            if let DataMode::Passive { local } = data.mode() {
                registry.remove(session.peer().ip(), local);
            }
            Err(e)
        }
    }
}

async fn connect_or_accept(
    session: &Arc<LogicalSession>,
    registry: &PendingSessionRegistry,
    timeout: Duration,
) -> Result<BoxedDataStream, TransferError> {
    let data = session.data();
    match data.mode() {
        DataMode::None => Err(TransferError::DataChannelNotInitialized),
        DataMode::Active { target } => {
            info!(
                "Active mode: connecting to {} for session {}",
                target,
                session.id()
            );
            let stream = tokio::time::timeout(timeout, TcpStream::connect(target))
                .await
                .map_err(|_| {
                    TransferError::DataConnectionFailed(format!("timeout connecting to {target}"))
                })?
                .map_err(|e| TransferError::DataConnectionFailed(e.to_string()))?;
            Ok(Box::new(stream))
        }
        DataMode::Passive { local } => {
            let listener = data
                .take_listener()
                .ok_or(TransferError::DataChannelNotInitialized)?;
            let deadline = Instant::now() + timeout;
            loop {
                let (stream, peer) = match tokio::time::timeout_at(deadline, listener.accept()).await
                {
                    Ok(Ok(accepted)) => accepted,
                    Ok(Err(e)) => return Err(TransferError::DataConnectionFailed(e.to_string())),
                    Err(_) => {
                        return Err(TransferError::DataConnectionFailed(format!(
                            "timeout waiting for connection on {local}"
                        )));
                    }
                };

                match registry.claim(peer.ip(), local, session.id()) {
                    Some(_) => {
                        debug!(
                            "Passive data connection from {} accepted for session {}",
                            peer,
                            session.id()
                        );
                        return Ok(Box::new(stream));
                    }
                    None => {
                        warn!(
                            "Rejected data connection from {} on {} (not awaited by session {})",
                            peer,
                            local,
                            session.id()
                        );
                        drop(stream);
                    }
                }
            }
        }
    }
}
