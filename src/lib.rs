//! RAX FTP core
//!
//! Connection lifecycle, data-connection negotiation and transfer
//! coordination for an RFC 959 FTP server, with a thin command layer on top.

pub mod auth;
pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod transfer;
pub mod utils;

pub use error::FtpServerError;
pub use server::{Server, ServerConfig};
