//! The `session` module is the boundary to the MQTT protocol library.
//!
//! [`ProtocolSession`] is what the tracker and the supervisor drive;
//! [`SessionCallbacks`] is the fixed consumer interface the session's I/O
//! task calls back into. [`RumqttSession`] implements the session on top of
//! `rumqttc`, using a [`Correlator`] to map its own correlation ids onto
//! MQTT packet ids.

pub mod correlator;
pub mod rumqtt;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;
use std::time::Duration;

use rumqttc::QoS;

pub use correlator::Correlator;
pub use rumqtt::RumqttSession;

use crate::config::TlsSettings;
use crate::tracker::CorrelationId;
use crate::utils::SessionError;

/// A connection to one broker.
///
/// Submissions never block on the network: they hand the request to the
/// session and return the id that the matching acknowledgment callback will
/// carry.
pub trait ProtocolSession: Send + Sync {
    fn submit_publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<CorrelationId, SessionError>;

    fn submit_subscribe(&self, topic: &str, qos: QoS) -> Result<CorrelationId, SessionError>;

    /// Prepares a connection to `host:port`. The handshake itself happens
    /// on the I/O task.
    fn connect_async(&self, host: &str, port: u16) -> Result<(), SessionError>;

    /// Starts the I/O task that delivers every callback to `callbacks`.
    fn start_io_loop(&self, callbacks: Arc<dyn SessionCallbacks>) -> Result<(), SessionError>;

    /// Asks the I/O task to dial the broker again after `delay`.
    fn reconnect(&self, delay: Duration) -> Result<(), SessionError>;

    fn configure_tls(&self, tls: &TlsSettings) -> Result<(), SessionError>;

    /// Closes the connection without reporting a disconnect.
    fn disconnect(&self) -> Result<(), SessionError>;

    fn is_connected(&self) -> bool;
}

/// Invoked from the session's I/O task.
pub trait SessionCallbacks: Send + Sync {
    fn on_connected(&self);

    fn on_disconnected(&self, reason: &str);

    /// For QoS 0 this fires once the publish has left the client; for QoS 1
    /// and 2 once the broker completed the handshake.
    fn on_publish_acked(&self, id: CorrelationId);

    fn on_subscribe_acked(&self, id: CorrelationId, granted: Option<QoS>);
}
