//! RAX FTP Server - Entry Point
//!
//! Loads the configuration, starts the server and turns Ctrl-C into a
//! graceful shutdown (a second Ctrl-C cuts it short).

use std::process::ExitCode;

use log::{error, info, warn};

use rax_ftp_core::utils::setup_logging;
use rax_ftp_core::{Server, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let config = ServerConfig::load();
    let level = config
        .as_ref()
        .map(|config| config.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    setup_logging(&level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Launching FTP server...");
    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = server.shutdown_token();
    let abort = server.abort_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down gracefully");
            shutdown.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second Ctrl-C received, forcing shutdown");
            abort.cancel();
        }
    });

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
