//! The `client` module defines the simulated thing as seen by scenario code.
//!
//! [`LoadClient`] bundles one protocol session with the operation tracker
//! and the connection supervisor, and is the single [`SessionCallbacks`]
//! consumer for that session.
//!
//! [`SessionCallbacks`]: crate::session::SessionCallbacks

pub mod load_client;
pub use load_client::LoadClient;
