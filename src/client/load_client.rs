use std::sync::Arc;
use std::time::Duration;

use rumqttc::QoS;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{ReconnectSettings, TlsSettings};
use crate::outcome::OutcomeSink;
use crate::session::{ProtocolSession, SessionCallbacks};
use crate::supervisor::ConnectionSupervisor;
use crate::tracker::{CorrelationId, OperationTracker, PublishOptions, SubscribeOptions};

/// One simulated thing.
///
/// Built once with its session and sink; the session's callbacks are routed
/// through the [`SessionCallbacks`] impl below and never rebound.
pub struct LoadClient {
    id: String,
    session: Arc<dyn ProtocolSession>,
    tracker: OperationTracker,
    supervisor: ConnectionSupervisor,
}

impl LoadClient {
    pub fn new(
        id: impl Into<String>,
        session: Arc<dyn ProtocolSession>,
        sink: Arc<dyn OutcomeSink>,
        reconnect: &ReconnectSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            tracker: OperationTracker::new(session.clone(), sink.clone()),
            supervisor: ConnectionSupervisor::new(session.clone(), sink, reconnect),
            session,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    pub fn configure_tls(&self, tls: &TlsSettings) -> bool {
        self.supervisor.configure_tls(tls)
    }

    /// Starts the asynchronous connect; see [`ConnectionSupervisor::connect`].
    pub fn connect(self: &Arc<Self>, host: &str, port: u16) -> bool {
        let callbacks: Arc<dyn SessionCallbacks> = self.clone();
        self.supervisor.connect(host, port, callbacks)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>, options: PublishOptions) {
        self.tracker.publish(topic, payload, options);
    }

    pub fn subscribe(&self, topic: &str, options: SubscribeOptions) {
        self.tracker.subscribe(topic, options);
    }

    /// Runs the tracker's timeout sweep every `interval` on the current
    /// runtime. Returns `None` when `interval` is zero.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }
        let client = self.clone();
        Some(tokio::spawn(async move {
            client.tracker.run_sweeper(interval).await;
        }))
    }

    /// Operations still waiting for an acknowledgment.
    pub fn pending(&self) -> usize {
        self.tracker.pending_publishes() + self.tracker.pending_subscribes()
    }

    pub fn shutdown(&self) {
        self.supervisor.disconnect();
    }

    /// Reports operations whose timeout already passed, disconnects, and
    /// returns how many were still legitimately in flight.
    pub fn finish(&self) -> usize {
        let expired = self.tracker.sweep_expired();
        if expired > 0 {
            debug!("{} expired {} operation(s) at shutdown", self.id, expired);
        }
        let pending = self.pending();
        self.shutdown();
        pending
    }
}

impl std::fmt::Debug for LoadClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadClient")
            .field("id", &self.id)
            .field("tracker", &self.tracker)
            .field("supervisor", &self.supervisor)
            .finish()
    }
}

impl SessionCallbacks for LoadClient {
    fn on_connected(&self) {
        self.supervisor.handle_connected();
    }

    fn on_disconnected(&self, reason: &str) {
        self.supervisor.handle_disconnected(reason);
    }

    fn on_publish_acked(&self, id: CorrelationId) {
        self.tracker.publish_acked(id);
    }

    fn on_subscribe_acked(&self, id: CorrelationId, granted: Option<QoS>) {
        self.tracker.subscribe_acked(id, granted);
    }
}
