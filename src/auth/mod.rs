//! Authentication system
//!
//! Checks USER and PASS against the users configured for the server.

pub mod validator;

pub use validator::{validate_password, validate_user};
