//! Logical session
//!
//! One transfer context multiplexed on a transport connection. A session
//! carries its data path, at most one [`Transfer`], the completion and
//! validation signals consulted by the connection owner, and an explicit
//! `closed` sentinel checked before any late use.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::client::state::{CompletionState, SessionOutcome};
use crate::error::TransferError;
use crate::transfer::data_channel::DataConnection;
use crate::transfer::job::Transfer;
use crate::transfer::results::TransferOutcome;
use crate::transfer::signal::CompletionSignal;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct LogicalSession {
    id: u64,
    peer: SocketAddr,
    data: Arc<DataConnection>,
    transfer: Mutex<Option<Arc<Transfer>>>,
    request: CompletionSignal<SessionOutcome>,
    validation: CompletionSignal<bool>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl LogicalSession {
    pub fn new(peer: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            data: Arc::new(DataConnection::new()),
            transfer: Mutex::new(None),
            request: CompletionSignal::new("session request"),
            validation: CompletionSignal::new("session validation"),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Peer address of the control connection this session belongs to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn data(&self) -> &Arc<DataConnection> {
        &self.data
    }

    /// Completes when the session is force-closed.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn current_transfer(&self) -> Option<Arc<Transfer>> {
        self.transfer.lock().clone()
    }

    /// Installs the session's transfer. Only one may be in flight.
    pub fn begin_transfer(&self, transfer: Arc<Transfer>) -> Result<(), TransferError> {
        if self.is_closed() {
            return Err(TransferError::Shutdown);
        }
        let mut current = self.transfer.lock();
        if current.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(TransferError::TransferInProgress);
        }
        self.data.prime_transfer();
        *current = Some(transfer);
        Ok(())
    }

    pub fn has_active_transfer(&self) -> bool {
        self.transfer
            .lock()
            .as_ref()
            .is_some_and(|transfer| transfer.is_active())
    }

    /// Marks the session's request as accepted.
    pub fn validate(&self) -> bool {
        self.validation.resolve(true)
    }

    /// Marks the session's request as rejected.
    pub fn invalidate(&self) -> bool {
        self.validation.resolve(false)
    }

    pub fn completion_state(&self) -> CompletionState {
        match self.request.peek() {
            Some(SessionOutcome::Success) => CompletionState::Done,
            Some(_) => CompletionState::Failed,
            None => match self.validation.peek() {
                Some(true) => CompletionState::Validated,
                Some(false) => CompletionState::ValidationFailed,
                None => CompletionState::Pending,
            },
        }
    }

    pub fn is_done(&self) -> bool {
        self.request.is_resolved()
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.request.peek()
    }

    pub async fn wait_done(&self, timeout: Duration) -> Option<SessionOutcome> {
        self.request.wait(timeout).await
    }

    pub async fn wait_validation(&self, timeout: Duration) -> Option<bool> {
        self.validation.wait(timeout).await
    }

    /// Records the session result if none was recorded yet. A `Shutdown`
    /// result also resolves the in-flight data movement, so the transfer
    /// worker terminates with that outcome.
    pub fn try_finalize(&self, outcome: SessionOutcome) -> bool {
        if outcome == SessionOutcome::Shutdown && self.has_active_transfer() {
            self.data.data_signal().try_resolve(TransferOutcome::Shutdown);
        }
        let finalized = self.request.try_resolve(outcome);
        if finalized {
            debug!("Session {} finalized as {:?}", self.id, outcome);
        }
        finalized
    }

    /// Forced close. Idempotent; every later call is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.validation.try_resolve(false);
        self.request.try_resolve(SessionOutcome::Shutdown);
        self.data.close();
        self.cancel.cancel();
        info!("Session {} from {} closed", self.id, self.peer);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
