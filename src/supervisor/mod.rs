//! The `supervisor` module owns the connection lifecycle of one simulated
//! thing: the initial asynchronous connect, TLS setup, and the reaction to
//! connects and disconnects reported by the session.

pub mod backoff;
pub mod connection;

pub use backoff::Backoff;
pub use connection::{CONNECT_LABEL, ConnectionSupervisor, DISCONNECT_LABEL, TLS_LABEL};
