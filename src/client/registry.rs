//! Connection registry
//!
//! Tracks the live transport connections of the server, closes the ones
//! that stayed empty past the idle timeout, and shuts all of them down
//! when the server stops.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, info};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::connection::{ShutdownDecision, TransportConnectionRef};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<u64, Arc<TransportConnectionRef>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: Arc<TransportConnectionRef>) {
        self.connections.insert(connection.id(), connection);
    }

    pub fn remove(&self, id: u64) -> Option<Arc<TransportConnectionRef>> {
        self.connections.remove(&id).map(|(_, connection)| connection)
    }

    pub fn get(&self, id: u64) -> Option<Arc<TransportConnectionRef>> {
        self.connections
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<TransportConnectionRef>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Closes the connections that have been empty for `idle_timeout`.
    /// Returns the ids of the closed connections.
    pub async fn sweep_idle(&self, idle_timeout: Duration) -> Vec<u64> {
        let mut closed = Vec::new();
        for connection in self.snapshot() {
            if connection.touch_if_busy() {
                continue;
            }
            match connection.evaluate_shutdown(idle_timeout).await {
                ShutdownDecision::AllowNow => {
                    connection.close_transport();
                    self.remove(connection.id());
                    closed.push(connection.id());
                }
                ShutdownDecision::RetryAfter(delay) => {
                    debug!("Connection {} idle, check again in {:?}", connection.id(), delay);
                }
                ShutdownDecision::Disallow => {}
            }
        }
        if !closed.is_empty() {
            info!("Idle sweep closed {} connection(s)", closed.len());
        }
        closed
    }

    /// Shuts down every registered connection concurrently, then closes
    /// their transports.
    pub async fn shutdown_all(&self, grace: Duration, cancel: &CancellationToken) {
        let connections = self.snapshot();
        let busy = connections
            .iter()
            .filter(|connection| connection.has_active_transfer())
            .count();
        info!(
            "Shutting down {} connection(s), {} with a transfer in flight",
            connections.len(),
            busy
        );
        let mut tasks = JoinSet::new();
        for connection in connections {
            let cancel = cancel.clone();
            tasks.spawn(async move {
                connection.shutdown_all(grace, &cancel).await;
                connection.close_transport();
                connection.id()
            });
        }
        while let Some(done) = tasks.join_next().await {
            if let Ok(id) = done {
                self.remove(id);
            }
        }
    }
}
