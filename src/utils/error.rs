//! Error types used within `mqtt-loadgen`.
//!
//! Errors raised by the protocol session never reach scenario code: the
//! tracker and the supervisor turn them into failure outcome events. They
//! only surface as `Result`s at the session boundary and from the runner.

use thiserror::Error;

/// Errors reported by a [`ProtocolSession`](crate::session::ProtocolSession).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no connection to broker")]
    NotConnected,
    #[error("request queue is full")]
    QueueFull,
    #[error("request rejected by client, {0}")]
    Rejected(String),
    #[error("no async runtime available to drive the session")]
    NoRuntime,
    #[error("i/o loop already started")]
    AlreadyStarted,
    #[error("tls configuration error, {0}")]
    Tls(String),
    #[error("{0}")]
    Msg(String),
}

impl SessionError {
    /// Short, stable category name used to group failures in the report.
    pub fn category(&self) -> &'static str {
        match self {
            SessionError::NotConnected => "no_connection",
            SessionError::QueueFull => "queue_full",
            SessionError::Rejected(_) => "rejected",
            SessionError::NoRuntime => "no_runtime",
            SessionError::AlreadyStarted => "already_started",
            SessionError::Tls(_) => "tls",
            SessionError::Msg(_) => "session",
        }
    }
}

impl From<String> for SessionError {
    #[inline]
    fn from(e: String) -> Self {
        SessionError::Msg(e)
    }
}

/// Errors that abort a whole load-test run (as opposed to a single operation).
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("configuration error, {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid setting, {0}")]
    InvalidSetting(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("task failed, {0}")]
    Join(#[from] tokio::task::JoinError),
}
