//! Outcome sinks
//!
//! The tracker and the supervisor only know the [`OutcomeSink`] trait. The
//! runner wires a [`ChannelSink`] per simulated thing, all feeding one
//! collector task; [`MemorySink`] keeps events in process for the `ping`
//! command and for tests.

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::event::{FailureKind, OutcomeEvent};

pub trait OutcomeSink: Send + Sync {
    fn record(&self, event: OutcomeEvent);

    fn report_success(&self, category: &'static str, label: &str, elapsed_ms: u64, response_size: usize) {
        let mut event = OutcomeEvent::success(label, elapsed_ms, response_size);
        event.category = category;
        self.record(event);
    }

    fn report_failure(
        &self,
        category: &'static str,
        label: &str,
        elapsed_ms: u64,
        error: FailureKind,
        response_size: usize,
    ) {
        let mut event = OutcomeEvent::failure(label, elapsed_ms, error, response_size);
        event.category = category;
        self.record(event);
    }
}

/// Forwards events to the collector over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<OutcomeEvent>,
}

impl ChannelSink {
    pub fn new(sender: UnboundedSender<OutcomeEvent>) -> Self {
        Self { sender }
    }
}

impl OutcomeSink for ChannelSink {
    fn record(&self, event: OutcomeEvent) {
        if let Err(e) = self.sender.send(event) {
            // collector already finished; the run is shutting down
            debug!("Dropping outcome for {}: collector closed", e.0.label);
        }
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<OutcomeEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutcomeEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drains the recorded events.
    pub fn take(&self) -> Vec<OutcomeEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl OutcomeSink for MemorySink {
    fn record(&self, event: OutcomeEvent) {
        self.events.lock().push(event);
    }
}
