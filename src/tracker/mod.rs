//! The `tracker` module is the heart of the load generator.
//!
//! It turns the session's fire-and-forget submissions and its asynchronous,
//! id-correlated acknowledgments into one measured [`OutcomeEvent`] per
//! operation:
//!
//! - `record`: the in-flight [`OperationRecord`] and its timeout rule.
//! - `pending`: the [`PendingTable`] mapping correlation ids to records.
//! - `engine`: the [`OperationTracker`] that submits, registers, resolves
//!   and sweeps.
//!
//! [`OutcomeEvent`]: crate::outcome::OutcomeEvent

pub mod engine;
pub mod pending;
pub mod record;

pub use engine::{OperationTracker, PublishOptions, RECORD_NOT_FOUND_LABEL, SubscribeOptions};
pub use pending::{Lookup, PendingTable};
pub use record::{CorrelationId, OperationKind, OperationRecord};

#[cfg(test)]
mod tests;
