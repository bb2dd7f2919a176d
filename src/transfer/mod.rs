//! Transfer module for FTP server
//!
//! Data-connection negotiation, the per-session data path and the
//! coordinator that runs each transfer to exactly one end-of-transfer signal.

pub mod channel_registry;
pub mod coordinator;
pub mod data_channel;
pub mod file_ops;
pub mod job;
pub mod modes;
pub mod operations;
pub mod port_allocator;
pub mod results;
pub mod signal;

pub use channel_registry::PendingSessionRegistry;
pub use coordinator::TransferCoordinator;
pub use data_channel::{DataConnection, open_data_stream};
pub use file_ops::{LocalFile, receive_file};
pub use job::{RetrieveSource, Transfer, TransferKind, TransferState};
pub use modes::{DataMode, ModePolicy};
pub use operations::DataConnectionNegotiator;
pub use port_allocator::PortAllocator;
pub use results::{ActiveModeResult, PassiveModeResult, TransferOutcome};
pub use signal::CompletionSignal;
