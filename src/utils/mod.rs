//! The `utils` module provides definitions shared across the load generator:
//! the error types returned by the protocol session and the runner, and the
//! tracing initialization used by the binary.

pub mod error;
pub mod logging;

pub use error::{LoadError, SessionError};
