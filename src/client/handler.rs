use log::{error, info};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

use crate::client::connection::TransportConnectionRef;
use crate::protocol::handlers::CommandContext;
use crate::protocol::responses::{ReplyCode, ReplySink, format_response};
use crate::protocol::{CommandStatus, handle_command, parse_command};
use crate::server::config::ServerConfig;
use crate::transfer::DataConnectionNegotiator;

const MAX_COMMAND_LENGTH: usize = 512;

/// Serves one control connection until the peer quits, the socket fails,
/// or the connection is closed from outside (idle sweep, server shutdown).
///
/// - Greets with `220`, then reads one command line at a time.
/// - Dispatches commands through `handle_command`.
/// - Releases every session of the connection on the way out.
pub async fn handle_client(
    cmd_stream: TcpStream,
    connection: Arc<TransportConnectionRef>,
    negotiator: Arc<DataConnectionNegotiator>,
    config: Arc<ServerConfig>,
) {
    let client_addr = connection.remote();
    let (read_half, write_half) = cmd_stream.into_split();
    let replies = ReplySink::new(write_half);
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let closed = connection.transport_closed();
    let mut ctx = CommandContext::new(Arc::clone(&connection), negotiator, config, replies.clone());

    info!(
        "Serving {} over {}",
        client_addr,
        if connection.is_tls() { "TLS" } else { "plain TCP" }
    );
    let greeting = format_response(ReplyCode::ServiceReady, "Welcome to RAX FTP Server");
    if let Err(e) = replies.send(&greeting).await {
        error!("Failed to greet {}: {}", client_addr, e);
        return;
    }

    loop {
        line.clear();
        let read = tokio::select! {
            read = reader.read_line(&mut line) => read,
            _ = closed.cancelled() => {
                let _ = replies
                    .send(&format_response(
                        ReplyCode::ServiceNotAvailable,
                        "Service closing control connection",
                    ))
                    .await;
                info!("Closing connection to {}", client_addr);
                break;
            }
        };

        match read {
            Ok(0) => {
                info!("Connection closed by client {}", client_addr);
                break;
            }
            Ok(_) => {
                if line.len() > MAX_COMMAND_LENGTH {
                    let _ = replies
                        .send(&format_response(ReplyCode::SyntaxError, "Command too long"))
                        .await;
                    continue;
                }

                connection.touch();
                let command = parse_command(&line);
                info!("Received from {}: {}", client_addr, command);

                let result = handle_command(&mut ctx, &command).await;
                if let Some(msg) = &result.message {
                    if let Err(e) = replies.send(msg).await {
                        error!("Failed to write to {}: {}", client_addr, e);
                        break;
                    }
                }
                if result.status == CommandStatus::CloseConnection {
                    info!("Client {} requested to quit", client_addr);
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read from {}: {}", client_addr, e);
                break;
            }
        }
    }

    ctx.release_sessions();
    let _ = replies.shutdown().await;
    info!("Client {} disconnected", client_addr);
}
