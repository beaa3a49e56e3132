use std::fmt;

use rumqttc::QoS;
use tokio::time::Instant;

/// Session-scoped identifier correlating a submission with its
/// acknowledgment. Ids are reused once the session's counter wraps.
pub type CorrelationId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Publish,
    Subscribe,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Publish => f.write_str("publish"),
            OperationKind::Subscribe => f.write_str("subscribe"),
        }
    }
}

/// One in-flight publish or subscribe.
///
/// `start_time` is captured right before the submission reaches the
/// session. A `timeout_ms` of 0 means the operation never times out.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub qos: QoS,
    pub topic: String,
    pub payload: Vec<u8>,
    pub start_time: Instant,
    pub timeout_ms: u64,
    pub label: String,
}

impl OperationRecord {
    pub fn publish(
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        label: &str,
        timeout_ms: u64,
        start_time: Instant,
    ) -> Self {
        Self {
            kind: OperationKind::Publish,
            qos,
            topic: topic.to_string(),
            payload,
            start_time,
            timeout_ms,
            label: label.to_string(),
        }
    }

    pub fn subscribe(topic: &str, qos: QoS, label: &str, timeout_ms: u64, start_time: Instant) -> Self {
        Self {
            kind: OperationKind::Subscribe,
            qos,
            topic: topic.to_string(),
            payload: Vec::new(),
            start_time,
            timeout_ms,
            label: label.to_string(),
        }
    }

    /// `true` only when a timeout is set and `elapsed_ms` strictly exceeds it.
    pub fn timed_out(&self, elapsed_ms: u64) -> bool {
        self.timeout_ms > 0 && elapsed_ms > self.timeout_ms
    }

    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        elapsed_ms_between(self.start_time, now)
    }

    /// Bytes reported on success: the payload for a publish, 0 for a subscribe.
    pub fn response_size(&self) -> usize {
        match self.kind {
            OperationKind::Publish => self.payload.len(),
            OperationKind::Subscribe => 0,
        }
    }
}

pub(crate) fn elapsed_ms_between(start: Instant, end: Instant) -> u64 {
    u64::try_from(end.saturating_duration_since(start).as_millis()).unwrap_or(u64::MAX)
}
