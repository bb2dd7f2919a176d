//! Server core functionality
//!
//! The accept loop, the idle sweep and graceful shutdown, plus the
//! server configuration.

pub mod config;
pub mod core;

pub use self::config::ServerConfig;
pub use self::core::Server;
