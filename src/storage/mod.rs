//! File system storage management
//!
//! Path resolution under the server root and directory listings.

pub mod operations;
pub mod validation;

pub use operations::{list_directory, list_names};
pub use validation::{MAX_DIRECTORY_DEPTH, resolve_path};
