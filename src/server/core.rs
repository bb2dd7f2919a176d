use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{ConnectionRegistry, ConnectionTimeouts, TransportConnectionRef, handle_client};
use crate::error::FtpServerError;
use crate::protocol::responses::{ReplyCode, format_response};
use crate::server::config::ServerConfig;
use crate::transfer::{DataConnectionNegotiator, PendingSessionRegistry};

pub struct Server {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    connections: Arc<ConnectionRegistry>,
    negotiator: Arc<DataConnectionNegotiator>,
    /// Stops accepting and starts the graceful shutdown.
    shutdown: CancellationToken,
    /// Cuts the graceful shutdown short.
    abort: CancellationToken,
}

impl Server {
    /// Validates the configuration, prepares the server root and binds the
    /// control listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, FtpServerError> {
        config.validate()?;
        let addr = SocketAddr::new(config.host, config.port);
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind to {}: {}", addr, e);
            e
        })?;
        info!("Server bound to {}", listener.local_addr()?);

        if let Err(e) = std::fs::create_dir_all(&config.server_root) {
            warn!("Failed to create server root directory: {}", e);
        } else {
            info!("Server root directory: {}", config.server_root_str());
        }

        let config = Arc::new(config);
        let registry = Arc::new(PendingSessionRegistry::new());
        Ok(Self {
            negotiator: Arc::new(DataConnectionNegotiator::new(Arc::clone(&config), registry)),
            config,
            listener,
            connections: Arc::new(ConnectionRegistry::new()),
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Serves clients until the shutdown token fires, then shuts every
    /// connection down gracefully.
    pub async fn run(self) -> Result<(), FtpServerError> {
        info!(
            "Starting Rax FTP server on {} (max {} clients)",
            self.local_addr()?,
            self.config.max_clients
        );

        let sweeper = tokio::spawn(sweep_idle_connections(
            Arc::clone(&self.connections),
            Arc::clone(&self.negotiator),
            Arc::clone(&self.config),
            self.shutdown.clone(),
        ));

        let mut clients = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((mut stream, peer)) => {
                        if self.connections.len() >= self.config.max_clients {
                            warn!("Rejecting {}: too many connections", peer);
                            let busy = format_response(
                                ReplyCode::ServiceNotAvailable,
                                "Too many connections. Try again later.",
                            );
                            let _ = stream.write_all(busy.as_bytes()).await;
                            continue;
                        }

                        let local = match stream.local_addr() {
                            Ok(local) => local,
                            Err(e) => {
                                warn!("Dropping {}: {}", peer, e);
                                continue;
                            }
                        };
                        let connection = Arc::new(TransportConnectionRef::new(
                            peer,
                            local,
                            false,
                            ConnectionTimeouts::from(self.config.as_ref()),
                        ));
                        self.connections.insert(Arc::clone(&connection));
                        info!(
                            "Accepted client {} ({}/{} clients)",
                            peer,
                            self.connections.len(),
                            self.config.max_clients
                        );

                        let connections = Arc::clone(&self.connections);
                        let negotiator = Arc::clone(&self.negotiator);
                        let config = Arc::clone(&self.config);
                        clients.spawn(async move {
                            handle_client(stream, Arc::clone(&connection), negotiator, config).await;
                            connections.remove(connection.id());
                        });
                    }
                    Err(e) => error!("Error accepting connection: {}", e),
                },
            }
            while clients.try_join_next().is_some() {}
        }

        info!("Shutdown requested, no longer accepting clients");
        self.connections
            .shutdown_all(self.config.grace_period(), &self.abort)
            .await;
        let _ = sweeper.await;

        // handlers notice their closed transport and exit on their own
        let drained = {
            let wait = tokio::time::timeout(self.config.grace_period(), async {
                while clients.join_next().await.is_some() {}
            });
            tokio::select! {
                waited = wait => waited.is_ok(),
                _ = self.abort.cancelled() => false,
            }
        };
        if !drained {
            warn!("Aborting {} client task(s) still running", clients.len());
            clients.abort_all();
        }
        info!("Server stopped");
        Ok(())
    }
}

async fn sweep_idle_connections(
    connections: Arc<ConnectionRegistry>,
    negotiator: Arc<DataConnectionNegotiator>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let mut ticks = tokio::time::interval(config.sweep_interval());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticks.tick() => {
                connections.sweep_idle(config.idle_timeout()).await;
                let purged = negotiator.registry().purge_closed();
                if purged > 0 {
                    info!("Purged {} stale pending data connection(s)", purged);
                }
            }
        }
    }
}
