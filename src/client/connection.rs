//! Transport connection reference
//!
//! Tracks the logical sessions multiplexed on one transport connection,
//! decides when the connection may be closed, and performs the two-phase
//! graceful-then-forced shutdown of its sessions.
//!
//! Membership changes are lock-free. The idle decision and the shutdown
//! procedure read the member count, the last-used instant and the
//! shutting-down flag as one unit, so both run under the connection lock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::session::LogicalSession;
use crate::client::state::SessionOutcome;
use crate::error::ConnectionError;
use crate::server::ServerConfig;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Answer of [`TransportConnectionRef::evaluate_shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownDecision {
    /// Sessions are attached; keep the connection.
    Disallow,
    AllowNow,
    /// Idle, but not for long enough yet; ask again after this delay.
    RetryAfter(Duration),
}

/// Timing knobs of the shutdown decision and procedure.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTimeouts {
    /// Scales the per-session waits during shutdown (a third of it).
    pub connection_timeout: Duration,
    pub check_retries: u32,
    pub check_interval: Duration,
    /// Longest wait for the connection lock before giving up a decision.
    pub lock_wait: Duration,
}

impl From<&ServerConfig> for ConnectionTimeouts {
    fn from(config: &ServerConfig) -> Self {
        Self {
            connection_timeout: config.connection_timeout(),
            check_retries: config.shutdown_check_retries,
            check_interval: config.shutdown_check_interval(),
            lock_wait: config.grace_period(),
        }
    }
}

#[derive(Debug)]
pub struct TransportConnectionRef {
    id: u64,
    remote: SocketAddr,
    local: SocketAddr,
    tls: bool,
    shutting_down: AtomicBool,
    last_used: Mutex<Instant>,
    lock: tokio::sync::Mutex<()>,
    sessions: DashMap<u64, Arc<LogicalSession>>,
    timeouts: ConnectionTimeouts,
    closed: CancellationToken,
}

impl TransportConnectionRef {
    pub fn new(
        remote: SocketAddr,
        local: SocketAddr,
        tls: bool,
        timeouts: ConnectionTimeouts,
    ) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            remote,
            local,
            tls,
            shutting_down: AtomicBool::new(false),
            last_used: Mutex::new(Instant::now()),
            lock: tokio::sync::Mutex::new(()),
            sessions: DashMap::new(),
            timeouts,
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn local(&self) -> SocketAddr {
        self.local
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    pub fn member_count(&self) -> usize {
        self.sessions.len()
    }

    /// Attaches a session. Refused once the connection is shutting down.
    pub fn attach(&self, session: Arc<LogicalSession>) -> Result<(), ConnectionError> {
        if self.is_shutting_down() {
            return Err(ConnectionError::Closing);
        }
        if session.is_closed() {
            return Err(ConnectionError::SessionClosed(session.id()));
        }
        self.touch();
        let id = session.id();
        self.sessions.insert(id, session);
        // A shutdown that started after the check above may have
        // snapshotted the members without this one.
        if self.is_shutting_down() {
            self.sessions.remove(&id);
            return Err(ConnectionError::Closing);
        }
        debug!("Session {} attached to connection {}", id, self.id);
        Ok(())
    }

    /// Refreshes the last-used instant unless shutting down.
    pub fn touch(&self) {
        if !self.is_shutting_down() {
            *self.last_used.lock() = Instant::now();
        }
    }

    /// Refreshes the last-used instant only when sessions are attached.
    pub fn touch_if_busy(&self) -> bool {
        if !self.is_shutting_down() && !self.sessions.is_empty() {
            *self.last_used.lock() = Instant::now();
            return true;
        }
        false
    }

    /// Removes a session from the membership set. The idle clock is left
    /// untouched so an emptied connection can still age out.
    pub fn detach(&self, session: &LogicalSession) -> bool {
        self.sessions.remove(&session.id()).is_some()
    }

    /// Closes the session unless it already completed, then detaches it.
    pub fn close_and_detach(&self, session: &LogicalSession) -> bool {
        if !session.is_done() {
            session.close();
        }
        self.detach(session)
    }

    /// Ends `session` after its transfer. When it was the last member of a
    /// connection that is shutting down, the transport is closed too.
    pub fn release(&self, session: &LogicalSession) -> bool {
        let last = self.is_only_member(session);
        let detached = self.close_and_detach(session);
        if last && self.is_shutting_down() {
            info!(
                "Last session {} of closing connection {} ended",
                session.id(),
                self.id
            );
            self.close_transport();
        }
        detached
    }

    /// Decides whether this connection may be closed for idleness.
    pub async fn evaluate_shutdown(&self, idle_timeout: Duration) -> ShutdownDecision {
        let Ok(_guard) = tokio::time::timeout(self.timeouts.lock_wait, self.lock.lock()).await
        else {
            warn!("Connection {} lock busy, keeping connection", self.id);
            return ShutdownDecision::Disallow;
        };
        debug!("Connection {} count: {}", self.id, self.sessions.len());
        if !self.sessions.is_empty() {
            return ShutdownDecision::Disallow;
        }

        // rule out an attach racing with this decision
        for _ in 0..self.timeouts.check_retries {
            tokio::time::sleep(self.timeouts.check_interval).await;
            if !self.sessions.is_empty() {
                self.touch();
                debug!("Ignore closing connection {}", self.id);
                return ShutdownDecision::Disallow;
            }
        }

        let idle = self.last_used().elapsed();
        match idle_timeout.checked_sub(idle) {
            Some(remaining) if !remaining.is_zero() => {
                let retry = round_up_to_10ms(remaining);
                debug!("Connection {} reschedule in {:?}", self.id, retry);
                ShutdownDecision::RetryAfter(retry)
            }
            _ => {
                info!("Closing idle connection {} ({})", self.id, self.remote);
                ShutdownDecision::AllowNow
            }
        }
    }

    /// Shuts down every attached session.
    ///
    /// Phase 1 gives each session a share of the first grace period to
    /// complete; sessions whose validation failed are deferred, the others
    /// are finalized with a shutdown result and closed. Phase 2 pauses for
    /// the rest of the first grace period, then force-closes the deferred
    /// sessions within the second one. `cancel` cuts every wait short.
    pub async fn shutdown_all(&self, grace: Duration, cancel: &CancellationToken) {
        let _guard = self.lock.lock().await;
        info!("Will shutdown all sessions of connection {}", self.id);
        self.shutting_down.store(true, Ordering::SeqCst);

        let phase_one = Instant::now() + grace;
        let phase_two = phase_one + grace;
        let share = self.timeouts.connection_timeout / 3;
        let members: Vec<Arc<LogicalSession>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut close_later = Vec::new();
        for session in members {
            let done = cancellable(cancel, session.wait_done(budget(share, phase_one))).await;
            if done.is_none() {
                let valid =
                    cancellable(cancel, session.wait_validation(budget(share, phase_one))).await;
                if valid == Some(false) {
                    close_later.push(session);
                    continue;
                }
                session.try_finalize(SessionOutcome::Shutdown);
            }
            session.close();
            self.sessions.remove(&session.id());
        }

        if !close_later.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep_until(phase_one) => {}
                _ = cancel.cancelled() => {}
            }
            for session in close_later {
                cancellable(cancel, session.wait_done(budget(share, phase_two))).await;
                info!(
                    "Force closing session {} on connection {}",
                    session.id(),
                    self.id
                );
                session.close();
                self.sessions.remove(&session.id());
            }
        }
    }

    /// True when at least one attached session has a running transfer.
    pub fn has_active_transfer(&self) -> bool {
        self.sessions
            .iter()
            .any(|entry| entry.value().has_active_transfer())
    }

    /// True when `session` is the sole remaining member, or none remain.
    pub fn is_only_member(&self, session: &LogicalSession) -> bool {
        self.sessions.is_empty()
            || (self.sessions.len() == 1 && self.sessions.contains_key(&session.id()))
    }

    /// Asks the owner of the transport to close it.
    pub fn close_transport(&self) {
        self.closed.cancel();
    }

    /// Completes once [`close_transport`](Self::close_transport) was called.
    pub fn transport_closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

fn budget(share: Duration, deadline: Instant) -> Duration {
    share.min(deadline.saturating_duration_since(Instant::now()))
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    wait: impl std::future::Future<Output = Option<T>>,
) -> Option<T> {
    tokio::select! {
        value = wait => value,
        _ = cancel.cancelled() => None,
    }
}

fn round_up_to_10ms(duration: Duration) -> Duration {
    let tens = duration.as_micros().div_ceil(10_000);
    Duration::from_millis(u64::try_from(tens * 10).unwrap_or(u64::MAX))
}
