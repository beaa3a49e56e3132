//! The `stats` module aggregates outcome events into the end-of-run report.
//!
//! Every simulated thing reports through a [`ChannelSink`](crate::outcome::ChannelSink);
//! [`collect`] drains the shared channel until the last sender is dropped.

pub mod entry;
pub mod report;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

pub use entry::RequestStats;
pub use report::{RunStats, TOTAL_LABEL};

use crate::outcome::OutcomeEvent;

/// Aggregates events until every sender is gone.
pub async fn collect(mut rx: UnboundedReceiver<OutcomeEvent>) -> RunStats {
    let mut stats = RunStats::new();
    while let Some(event) = rx.recv().await {
        stats.log(&event);
    }
    debug!("collector closed after {} label(s)", stats.entries.len());
    stats.finish();
    stats
}

#[cfg(test)]
mod tests;
