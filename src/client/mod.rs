//! Client management system
//!
//! Transport connections, the logical sessions multiplexed on them, and
//! the per-connection command loop.

pub mod connection;
pub mod handler;
pub mod registry;
pub mod session;
pub mod state;

pub use connection::{ConnectionTimeouts, ShutdownDecision, TransportConnectionRef};
pub use handler::handle_client;
pub use registry::ConnectionRegistry;
pub use session::LogicalSession;
pub use state::{CompletionState, ControlState, SessionOutcome};
