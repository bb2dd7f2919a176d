//! Transfer operations
//!
//! Data-connection negotiation for PASV and PORT. Passive setup allocates a
//! port from the configured range, retrying on bind failures, and records
//! the session in the [`PendingSessionRegistry`] so the acceptor can
//! correlate the inbound connection. Active setup only validates and records
//! the target; the outbound connect happens when a transfer starts.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::TcpListener;

use crate::client::LogicalSession;
use crate::error::TransferError;
use crate::protocol::address::{format_host_port, parse_port_argument};
use crate::protocol::responses::{ReplyCode, format_response};
use crate::server::ServerConfig;
use crate::transfer::channel_registry::PendingSessionRegistry;
use crate::transfer::modes::DataMode;
use crate::transfer::port_allocator::PortAllocator;
use crate::transfer::results::{ActiveModeResult, PassiveModeResult};

#[derive(Debug)]
pub struct DataConnectionNegotiator {
    config: Arc<ServerConfig>,
    ports: PortAllocator,
    registry: Arc<PendingSessionRegistry>,
}

impl DataConnectionNegotiator {
    pub fn new(config: Arc<ServerConfig>, registry: Arc<PendingSessionRegistry>) -> Self {
        let ports = PortAllocator::new(config.passive_port_min, config.passive_port_max);
        Self {
            config,
            ports,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<PendingSessionRegistry> {
        &self.registry
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    /// Sets `session` up for a passive data connection.
    pub async fn enter_passive_mode(
        &self,
        session: &Arc<LogicalSession>,
        argument: Option<&str>,
    ) -> Result<PassiveModeResult, TransferError> {
        if !self.config.mode_policy.allows_passive() {
            return Err(TransferError::PassiveNotAllowed);
        }
        if argument.is_some_and(|arg| !arg.trim().is_empty()) {
            return Err(TransferError::UnexpectedArgument);
        }

        let peer_ip = session.peer().ip();
        if let DataMode::Passive { local } = session.data().mode() {
            debug!(
                "Session {} replaces its passive setup on {}",
                session.id(),
                local
            );
            self.registry.remove(peer_ip, local);
            session.data().clear();
        }

        let (listener, local) = self.bind_passive_listener().await?;

        let advertised = self.config.public_address.unwrap_or(local.ip());
        let IpAddr::V4(advertised) = advertised else {
            return Err(TransferError::UnsupportedAddress(advertised));
        };
        if advertised.is_unspecified() {
            return Err(TransferError::UnsupportedAddress(IpAddr::V4(advertised)));
        }

        session.data().set_passive(listener, local);
        self.registry.insert(peer_ip, local, session);
        session.data().prime();

        info!(
            "Session {} from {} listening for data on {}",
            session.id(),
            session.peer(),
            local
        );
        let reply = format_response(
            ReplyCode::EnteringPassiveMode,
            &format!(
                "Entering Passive Mode ({}).",
                format_host_port(advertised, local.port())
            ),
        );
        Ok(PassiveModeResult {
            local_addr: local,
            reply,
        })
    }

    /// Binds the next free port of the range, trying at most
    /// `port_bind_retries` ports.
    async fn bind_passive_listener(&self) -> Result<(TcpListener, SocketAddr), TransferError> {
        let attempts = self.config.port_bind_retries;
        for attempt in 1..=attempts {
            let port = self.ports.next_port();
            let addr = SocketAddr::new(self.config.host, port);
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    let local = listener.local_addr()?;
                    return Ok((listener, local));
                }
                Err(e) => warn!(
                    "Passive bind on {} failed ({:?}), attempt {}/{}: {}",
                    addr,
                    e.kind(),
                    attempt,
                    attempts,
                    e
                ),
            }
        }
        Err(TransferError::NoPortAvailable { attempts })
    }

    /// Records the active-mode target of `session`. Without an argument the
    /// control connection's peer address is used.
    pub fn enter_active_mode(
        &self,
        session: &Arc<LogicalSession>,
        argument: Option<&str>,
    ) -> Result<ActiveModeResult, TransferError> {
        if !self.config.mode_policy.allows_active() {
            return Err(TransferError::ActiveNotAllowed);
        }

        let peer = session.peer();
        let target = match argument.map(str::trim).filter(|arg| !arg.is_empty()) {
            None => peer,
            Some(arg) => {
                let target = parse_port_argument(arg)
                    .ok_or_else(|| TransferError::InvalidAddress(arg.to_string()))?;
                if target.ip() != peer.ip() {
                    warn!(
                        "Session {}: PORT address {} does not match client {}",
                        session.id(),
                        target.ip(),
                        peer.ip()
                    );
                    return Err(TransferError::AddressMismatch {
                        expected: peer.ip(),
                        provided: target.ip(),
                    });
                }
                target
            }
        };

        if let DataMode::Passive { local } = session.data().mode() {
            self.registry.remove(peer.ip(), local);
        }
        session.data().set_active(target);
        session.data().prime();

        info!("Session {} will connect out to {}", session.id(), target);
        Ok(ActiveModeResult {
            target,
            reply: format_response(
                ReplyCode::CommandOkay,
                &format!("PORT command successful ({target})"),
            ),
        })
    }
}
