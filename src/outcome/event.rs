use thiserror::Error;

use crate::tracker::OperationKind;
use crate::utils::SessionError;

/// Request-type tag attached to every event.
pub const REQUEST_TYPE: &str = "MQTT";

/// Classification carried by a failed outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    #[error("transport error, {0}")]
    Transport(SessionError),
    #[error("{0} timed out")]
    Timeout(OperationKind),
    #[error("{0} record could not be found")]
    RecordNotFound(OperationKind),
    #[error("{0} correlation id reused before acknowledgment")]
    IdentifierReused(OperationKind),
    #[error("subscription rejected by broker")]
    SubscribeRejected,
    #[error("disconnected, {0}")]
    Disconnected(String),
    #[error("connect failed, {0}")]
    Connect(SessionError),
    #[error("tls setup failed, {0}")]
    TlsConfig(SessionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(FailureKind),
}

/// One measured operation, as handed to the statistics collector.
///
/// `elapsed_ms` is whole milliseconds between the operation's start and the
/// moment its acknowledgment (or failure) was processed. `response_size` is
/// the payload length for a successful publish and 0 everywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeEvent {
    pub category: &'static str,
    pub label: String,
    pub elapsed_ms: u64,
    pub response_size: usize,
    pub outcome: Outcome,
}

impl OutcomeEvent {
    pub fn success(label: impl Into<String>, elapsed_ms: u64, response_size: usize) -> Self {
        Self {
            category: REQUEST_TYPE,
            label: label.into(),
            elapsed_ms,
            response_size,
            outcome: Outcome::Success,
        }
    }

    pub fn failure(
        label: impl Into<String>,
        elapsed_ms: u64,
        kind: FailureKind,
        response_size: usize,
    ) -> Self {
        Self {
            category: REQUEST_TYPE,
            label: label.into(),
            elapsed_ms,
            response_size,
            outcome: Outcome::Failure(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }

    pub fn failure_kind(&self) -> Option<&FailureKind> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failure(kind) => Some(kind),
        }
    }
}
