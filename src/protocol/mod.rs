//! FTP Protocol implementation
//!
//! Handles FTP command parsing, host-port encoding, command dispatch and
//! response generation.

pub mod address;
pub mod commands;
pub mod handlers;
pub mod parser;
pub mod responses;

pub use commands::{Command, CommandResult, CommandStatus};
pub use handlers::{CommandContext, handle_command};
pub use parser::parse_command;
pub use responses::{ReplyCode, ReplySink, format_response};
