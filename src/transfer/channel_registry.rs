//! Module `channel_registry`
//!
//! Registry of sessions waiting for an inbound passive data connection,
//! keyed by `(peer ip, local bound address)`. Owned by the server instance
//! and shared with the data-connection acceptor.
//!
//! Entries hold weak references: a session closed before its data
//! connection arrives is never handed out, and `purge_closed` drops its
//! entry.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use log::{debug, info};

use crate::client::LogicalSession;

pub type PendingKey = (IpAddr, SocketAddr);

#[derive(Debug, Default)]
pub struct PendingSessionRegistry {
    entries: DashMap<PendingKey, Weak<LogicalSession>>,
}

impl PendingSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `session` as awaiting a connection from `remote` on `local`,
    /// replacing any previous entry for that pair.
    pub fn insert(&self, remote: IpAddr, local: SocketAddr, session: &Arc<LogicalSession>) {
        if let Some(previous) = self.entries.insert((remote, local), Arc::downgrade(session)) {
            if let Some(previous) = previous.upgrade() {
                info!(
                    "Pending data connection ({remote}, {local}) moved from session {} to {}",
                    previous.id(),
                    session.id()
                );
            }
        }
    }

    /// Removes and returns the session awaiting `(remote, local)`, if it is
    /// still open.
    pub fn take(&self, remote: IpAddr, local: SocketAddr) -> Option<Arc<LogicalSession>> {
        let (_, weak) = self.entries.remove(&(remote, local))?;
        weak.upgrade().filter(|session| !session.is_closed())
    }

    /// Like [`take`](Self::take), but only consumes the entry when it
    /// belongs to `session_id`.
    pub fn claim(
        &self,
        remote: IpAddr,
        local: SocketAddr,
        session_id: u64,
    ) -> Option<Arc<LogicalSession>> {
        let (_, weak) = self.entries.remove_if(&(remote, local), |_, weak| {
            weak.upgrade().is_some_and(|s| s.id() == session_id)
        })?;
        weak.upgrade().filter(|session| !session.is_closed())
    }

    pub fn remove(&self, remote: IpAddr, local: SocketAddr) -> bool {
        let removed = self.entries.remove(&(remote, local)).is_some();
        if removed {
            debug!("Pending data connection ({remote}, {local}) removed");
        }
        removed
    }

    pub fn contains(&self, remote: IpAddr, local: SocketAddr) -> bool {
        self.entries.contains_key(&(remote, local))
    }

    /// Drops the entries of sessions that are gone or closed.
    pub fn purge_closed(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, weak| weak.upgrade().is_some_and(|s| !s.is_closed()));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
