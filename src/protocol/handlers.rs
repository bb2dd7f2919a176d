//! Command handlers module for the Rax FTP server.
//!
//! Thin glue between parsed commands and the connection core: login,
//! data-connection negotiation on the connection's current logical session,
//! and transfer start-up. Transfers run on their own tasks; their final
//! reply is written by a reply worker so the command loop keeps going.

use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::auth;
use crate::client::{ControlState, LogicalSession, SessionOutcome, TransportConnectionRef};
use crate::error::handlers::{error_reply, handle_error};
use crate::error::{AuthError, ConnectionError, FtpServerError, TransferError};
use crate::protocol::commands::{Command, CommandResult, CommandStatus};
use crate::protocol::responses::{ReplyCode, ReplySink, format_response};
use crate::server::ServerConfig;
use crate::storage;
use crate::transfer::{
    DataConnectionNegotiator, LocalFile, Transfer, TransferCoordinator, TransferOutcome,
    open_data_stream, receive_file,
};

/// Everything a command needs from its control connection.
pub struct CommandContext {
    state: ControlState,
    connection: Arc<TransportConnectionRef>,
    negotiator: Arc<DataConnectionNegotiator>,
    config: Arc<ServerConfig>,
    replies: ReplySink,
    /// Session set up by the last PASV/PORT, waiting for a transfer command.
    current: Option<Arc<LogicalSession>>,
    /// Session whose transfer was started last.
    in_flight: Option<Arc<LogicalSession>>,
}

impl CommandContext {
    pub fn new(
        connection: Arc<TransportConnectionRef>,
        negotiator: Arc<DataConnectionNegotiator>,
        config: Arc<ServerConfig>,
        replies: ReplySink,
    ) -> Self {
        Self {
            state: ControlState::new(connection.remote()),
            connection,
            negotiator,
            config,
            replies,
            current: None,
            in_flight: None,
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn connection(&self) -> &Arc<TransportConnectionRef> {
        &self.connection
    }

    pub fn replies(&self) -> &ReplySink {
        &self.replies
    }

    /// Session the next PASV/PORT negotiates on; `true` when freshly created.
    fn negotiation_session(&self) -> (Arc<LogicalSession>, bool) {
        match &self.current {
            Some(session) if !session.is_closed() => (Arc::clone(session), false),
            _ => (LogicalSession::new(self.connection.remote()), true),
        }
    }

    /// Makes a successfully negotiated session the current one.
    fn adopt(&mut self, session: Arc<LogicalSession>, fresh: bool, reply: String) -> CommandResult {
        if fresh {
            if let Err(e) = self.connection.attach(Arc::clone(&session)) {
                session.close();
                self.negotiator.registry().purge_closed();
                return error_result(e);
            }
            if let Some(previous) = self.current.replace(session) {
                self.connection.close_and_detach(&previous);
            }
        }
        self.connection.touch();
        CommandResult::success(reply)
    }

    /// Closes every session this control connection still owns.
    pub fn release_sessions(&mut self) {
        for session in [self.current.take(), self.in_flight.take()]
            .into_iter()
            .flatten()
        {
            self.connection.close_and_detach(&session);
        }
        self.negotiator.registry().purge_closed();
    }
}

fn error_result(err: impl Into<FtpServerError>) -> CommandResult {
    let err = err.into();
    handle_error(&err);
    CommandResult::failure(err.to_string(), error_reply(&err))
}

/// Dispatches a received FTP command to its corresponding handler.
pub async fn handle_command(ctx: &mut CommandContext, command: &Command) -> CommandResult {
    if !ctx.state.is_logged_in() && !command.allowed_before_login() {
        return error_result(AuthError::NotLoggedIn);
    }

    match command {
        Command::User(username) => handle_cmd_user(ctx, username),
        Command::Pass(password) => handle_cmd_pass(ctx, password),
        Command::Pasv(arg) => handle_cmd_pasv(ctx, arg.as_deref()).await,
        Command::Port(arg) => handle_cmd_port(ctx, arg.as_deref()),
        Command::List(path) => handle_cmd_list(ctx, path.as_deref(), false).await,
        Command::Nlst(path) => handle_cmd_list(ctx, path.as_deref(), true).await,
        Command::Retr(path) => handle_cmd_retr(ctx, path).await,
        Command::Stor(path) => handle_cmd_stor(ctx, path).await,
        Command::Abor => handle_cmd_abor(ctx),
        Command::Noop => {
            ctx.connection.touch();
            CommandResult::success(format_response(ReplyCode::CommandOkay, "NOOP ok"))
        }
        Command::Quit => handle_cmd_quit(ctx),
        Command::MissingArgument(verb) => CommandResult::failure(
            format!("{verb} needs an argument"),
            format_response(ReplyCode::SyntaxErrorInParameters, "Syntax error in parameters"),
        ),
        Command::Unknown(verb) => CommandResult::failure(
            format!("unsupported command {verb}"),
            format_response(ReplyCode::NotImplemented, "Command not implemented"),
        ),
    }
}

fn handle_cmd_user(ctx: &mut CommandContext, username: &str) -> CommandResult {
    match auth::validate_user(username, &ctx.config.users) {
        Ok(()) => {
            ctx.state.set_user(Some(username.to_string()));
            CommandResult::success(format_response(
                ReplyCode::PasswordRequired,
                &format!("Password required for {username}"),
            ))
        }
        Err(e) => {
            ctx.state.set_user(None);
            error_result(e)
        }
    }
}

fn handle_cmd_pass(ctx: &mut CommandContext, password: &str) -> CommandResult {
    let Some(username) = ctx
        .state
        .username()
        .filter(|_| ctx.state.is_user_valid())
        .map(str::to_string)
    else {
        return error_result(AuthError::UserRequired);
    };

    match auth::validate_password(&username, password, &ctx.config.users) {
        Ok(()) => {
            ctx.state.set_logged_in(true);
            info!("User {} logged in from {}", username, ctx.state.peer_addr());
            CommandResult::success(format_response(ReplyCode::LoginSuccessful, "Login successful"))
        }
        Err(e) => {
            ctx.state.set_logged_in(false);
            error_result(e)
        }
    }
}

async fn handle_cmd_pasv(ctx: &mut CommandContext, arg: Option<&str>) -> CommandResult {
    let (session, fresh) = ctx.negotiation_session();
    match ctx.negotiator.enter_passive_mode(&session, arg).await {
        Ok(result) => ctx.adopt(session, fresh, result.reply),
        Err(e) => error_result(e),
    }
}

fn handle_cmd_port(ctx: &mut CommandContext, arg: Option<&str>) -> CommandResult {
    let (session, fresh) = ctx.negotiation_session();
    match ctx.negotiator.enter_active_mode(&session, arg) {
        Ok(result) => ctx.adopt(session, fresh, result.reply),
        Err(e) => error_result(e),
    }
}

async fn handle_cmd_list(ctx: &mut CommandContext, path: Option<&str>, names_only: bool) -> CommandResult {
    let path = path.unwrap_or("/");
    let listing = if names_only {
        storage::list_names(&ctx.config.server_root, path)
    } else {
        storage::list_directory(&ctx.config.server_root, path)
    };
    match listing {
        Ok(lines) => start_transfer(ctx, Transfer::list(path, lines), None).await,
        Err(e) => error_result(e),
    }
}

async fn handle_cmd_retr(ctx: &mut CommandContext, path: &str) -> CommandResult {
    match storage::resolve_path(&ctx.config.server_root, path) {
        Ok(real) => {
            let source = Arc::new(LocalFile::new(real));
            start_transfer(ctx, Transfer::retrieve(path, source), None).await
        }
        Err(e) => error_result(e),
    }
}

async fn handle_cmd_stor(ctx: &mut CommandContext, path: &str) -> CommandResult {
    match storage::resolve_path(&ctx.config.server_root, path) {
        Ok(real) => start_transfer(ctx, Transfer::store(path), Some(real)).await,
        Err(e) => error_result(e),
    }
}

/// Opens the data connection of the current session and hands the transfer
/// to a coordinator task. `upload` is the destination of a store.
async fn start_transfer(
    ctx: &mut CommandContext,
    transfer: Transfer,
    upload: Option<PathBuf>,
) -> CommandResult {
    if ctx.connection.is_shutting_down() {
        return error_result(ConnectionError::Closing);
    }
    if ctx.in_flight.as_ref().is_some_and(|s| !s.is_done()) {
        return error_result(TransferError::TransferInProgress);
    }
    let Some(session) = ctx.current.take() else {
        return error_result(TransferError::DataChannelNotInitialized);
    };

    let transfer = Arc::new(transfer);
    if let Err(e) = session.begin_transfer(Arc::clone(&transfer)) {
        ctx.current = Some(session);
        return error_result(e);
    }

    let opened = open_data_stream(
        &session,
        ctx.negotiator.registry(),
        ctx.config.connection_timeout(),
    )
    .await
    .and_then(|()| {
        // shutdown may have started while the data connection was opening
        if ctx.connection.is_shutting_down() || session.is_closed() {
            Err(TransferError::Shutdown)
        } else {
            Ok(())
        }
    });
    if let Err(e) = opened {
        session.invalidate();
        transfer.finish(false);
        session.try_finalize(SessionOutcome::Failed);
        session.data().shutdown_stream().await;
        ctx.connection.release(&session);
        return error_result(e);
    }

    session.validate();
    ctx.connection.touch();
    if let Err(e) = ctx
        .replies
        .send(&format_response(
            ReplyCode::FileStatusOkay,
            "Opening data connection",
        ))
        .await
    {
        warn!("Failed to send 150 to {}: {}", ctx.state.peer_addr(), e);
    }

    if let Some(destination) = upload {
        receive_file(Arc::clone(session.data()), destination);
    }
    let worker =
        TransferCoordinator::new(Arc::clone(&session), ctx.config.transfer_timeout()).spawn();
    tokio::spawn(report_transfer_end(
        worker,
        Arc::clone(&session),
        Arc::clone(&ctx.connection),
        ctx.replies.clone(),
    ));
    ctx.in_flight = Some(session);

    CommandResult {
        status: CommandStatus::Success,
        message: None,
    }
}

/// Sends the final transfer reply, then finalizes and detaches the session.
async fn report_transfer_end(
    worker: JoinHandle<TransferOutcome>,
    session: Arc<LogicalSession>,
    connection: Arc<TransportConnectionRef>,
    replies: ReplySink,
) {
    let outcome = worker.await.unwrap_or_else(|e| {
        error!("Transfer worker of session {} failed: {}", session.id(), e);
        TransferOutcome::Failed
    });

    let reply = match outcome {
        TransferOutcome::Success => format_response(ReplyCode::TransferComplete, "Transfer complete"),
        TransferOutcome::FileUnavailable => {
            format_response(ReplyCode::FileUnavailable, "File not found")
        }
        _ => format_response(
            ReplyCode::TransferAborted,
            "Connection closed; transfer aborted",
        ),
    };
    if let Err(e) = replies.send(&reply).await {
        warn!("Failed to send transfer reply for session {}: {}", session.id(), e);
    }

    let result = match outcome {
        TransferOutcome::Success => SessionOutcome::Success,
        TransferOutcome::Shutdown => SessionOutcome::Shutdown,
        _ => SessionOutcome::Failed,
    };
    session.try_finalize(result);
    connection.release(&session);
}

fn handle_cmd_abor(ctx: &mut CommandContext) -> CommandResult {
    match ctx.in_flight.as_ref().filter(|s| !s.is_done()) {
        Some(session) => {
            session
                .data()
                .data_signal()
                .try_resolve(TransferOutcome::Aborted);
            info!("Transfer of session {} aborted by client", session.id());
            CommandResult::success(format_response(
                ReplyCode::TransferComplete,
                "ABOR command successful",
            ))
        }
        None => CommandResult::success(format_response(
            ReplyCode::TransferComplete,
            "No transfer to abort",
        )),
    }
}

fn handle_cmd_quit(ctx: &mut CommandContext) -> CommandResult {
    ctx.state.logout();
    if let Some(session) = ctx.current.take() {
        ctx.connection.close_and_detach(&session);
    }
    CommandResult::close(format_response(
        ReplyCode::ClosingControlConnection,
        "Goodbye",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectionTimeouts;
    use crate::transfer::{DataMode, ModePolicy, PendingSessionRegistry};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn context_with(config: ServerConfig) -> CommandContext {
        let config = Arc::new(config);
        let connection = Arc::new(TransportConnectionRef::new(
            "127.0.0.1:5555".parse().unwrap(),
            "127.0.0.1:2121".parse().unwrap(),
            false,
            ConnectionTimeouts::from(config.as_ref()),
        ));
        let negotiator = Arc::new(DataConnectionNegotiator::new(
            Arc::clone(&config),
            Arc::new(PendingSessionRegistry::new()),
        ));
        let (local, _remote) = tokio::io::duplex(1024);
        CommandContext::new(connection, negotiator, config, ReplySink::new(local))
    }

    async fn logged_in(config: ServerConfig) -> CommandContext {
        let mut ctx = context_with(config);
        handle_command(&mut ctx, &Command::User("alice".into())).await;
        handle_command(&mut ctx, &Command::Pass("alice123".into())).await;
        assert!(ctx.state().is_logged_in());
        ctx
    }

    fn reply(result: &CommandResult) -> &str {
        result.message.as_deref().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_commands_require_login() {
        let mut ctx = context_with(ServerConfig::default());
        let result = handle_command(&mut ctx, &Command::Pasv(None)).await;
        assert_eq!(reply(&result), "530 Not logged in\r\n");
        assert_eq!(ctx.connection().member_count(), 0);
    }

    #[tokio::test]
    async fn test_login_flow() {
        let mut ctx = context_with(ServerConfig::default());
        let result = handle_command(&mut ctx, &Command::Pass("x".into())).await;
        assert!(reply(&result).starts_with("503 "));

        let result = handle_command(&mut ctx, &Command::User("alice".into())).await;
        assert!(reply(&result).starts_with("331 "));
        let result = handle_command(&mut ctx, &Command::Pass("nope".into())).await;
        assert!(reply(&result).starts_with("530 "));
        assert!(!ctx.state().is_logged_in());
    }

    #[tokio::test]
    async fn test_pasv_with_argument_is_syntax_error() {
        let mut ctx = logged_in(ServerConfig::default()).await;
        let result = handle_command(&mut ctx, &Command::Pasv(Some("x".into()))).await;
        assert_eq!(reply(&result), "501 No argument allowed\r\n");
        assert_eq!(ctx.connection().member_count(), 0);
    }

    #[tokio::test]
    async fn test_pasv_rejected_on_active_only_server() {
        let mut ctx = logged_in(ServerConfig {
            mode_policy: ModePolicy::Active,
            ..ServerConfig::default()
        })
        .await;
        let result = handle_command(&mut ctx, &Command::Pasv(None)).await;
        assert_eq!(reply(&result), "501 Passive mode not allowed\r\n");
    }

    #[tokio::test]
    async fn test_port_attaches_one_session() {
        let mut ctx = logged_in(ServerConfig::default()).await;
        let result = handle_command(&mut ctx, &Command::Port(None)).await;
        assert!(reply(&result).starts_with("200 "));
        assert_eq!(ctx.connection().member_count(), 1);

        // renegotiation reuses the current session
        handle_command(&mut ctx, &Command::Port(Some("127,0,0,1,7,233".into()))).await;
        assert_eq!(ctx.connection().member_count(), 1);

        let result =
            handle_command(&mut ctx, &Command::Port(Some("10,0,0,1,7,233".into()))).await;
        assert_eq!(
            reply(&result),
            "501 Given Inet Address mismatches actual client Address\r\n"
        );
    }

    #[tokio::test]
    async fn test_transfer_without_negotiation() {
        let root = tempfile::TempDir::new().unwrap();
        let mut ctx = logged_in(ServerConfig {
            server_root: root.path().to_path_buf(),
            ..ServerConfig::default()
        })
        .await;
        let result = handle_command(&mut ctx, &Command::List(None)).await;
        assert!(reply(&result).starts_with("425 "));
    }

    #[tokio::test]
    async fn test_transfer_refused_while_shutting_down() {
        let mut ctx = logged_in(ServerConfig::default()).await;
        handle_command(&mut ctx, &Command::Port(None)).await;
        ctx.connection()
            .shutdown_all(
                std::time::Duration::from_millis(10),
                &tokio_util::sync::CancellationToken::new(),
            )
            .await;
        let result = handle_command(&mut ctx, &Command::Retr("a.txt".into())).await;
        assert!(reply(&result).starts_with("421 "));
    }

    #[tokio::test]
    async fn test_transfer_refused_when_shutdown_starts_during_open() {
        let root = tempfile::TempDir::new().unwrap();
        let scratch = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let first = scratch.local_addr().unwrap().port();
        drop(scratch);
        let mut ctx = logged_in(ServerConfig {
            server_root: root.path().to_path_buf(),
            passive_port_min: first,
            passive_port_max: first.saturating_add(20),
            port_bind_retries: 10,
            ..ServerConfig::default()
        })
        .await;
        let result = handle_command(&mut ctx, &Command::Pasv(None)).await;
        assert!(reply(&result).starts_with("227 "));
        let DataMode::Passive { local } = ctx.current.as_ref().unwrap().data().mode() else {
            panic!("passive mode expected");
        };

        let connection = Arc::clone(ctx.connection());
        let peer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let closing = Arc::clone(&connection);
            let shutdown = tokio::spawn(async move {
                closing
                    .shutdown_all(Duration::from_secs(2), &CancellationToken::new())
                    .await;
            });
            while !connection.is_shutting_down() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let stream = tokio::net::TcpStream::connect(local).await.unwrap();
            (stream, shutdown)
        });

        let result = handle_command(&mut ctx, &Command::List(None)).await;
        assert!(reply(&result).starts_with("421 "), "{:?}", result.message);
        let (_stream, shutdown) = peer.await.unwrap();
        shutdown.await.unwrap();
        assert_eq!(ctx.connection().member_count(), 0);
    }

    #[tokio::test]
    async fn test_abor_without_transfer_and_unknown() {
        let mut ctx = logged_in(ServerConfig::default()).await;
        let result = handle_command(&mut ctx, &Command::Abor).await;
        assert!(reply(&result).starts_with("226 "));
        let result = handle_command(&mut ctx, &Command::Unknown("SITE".into())).await;
        assert!(reply(&result).starts_with("502 "));
        let result = handle_command(&mut ctx, &Command::Quit).await;
        assert_eq!(result.status, CommandStatus::CloseConnection);
    }
}
