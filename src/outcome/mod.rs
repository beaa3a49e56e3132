//! The `outcome` module defines the normalized unit the load generator
//! emits for every operation, and the sinks that carry those events to the
//! statistics collector.
//!
//! Every publish, subscribe, connect and disconnect ends up as exactly one
//! [`OutcomeEvent`] handed to an [`OutcomeSink`]; nothing else is reported
//! back to scenario code.

pub mod event;
pub mod sink;

pub use event::{FailureKind, Outcome, OutcomeEvent, REQUEST_TYPE};
pub use sink::{ChannelSink, MemorySink, OutcomeSink};
