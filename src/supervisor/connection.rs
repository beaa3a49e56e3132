//! Connection supervisor
//!
//! Reports connection lifecycle changes as outcome events and asks the
//! session to reconnect after every unexpected disconnect.
//!
//! The session's I/O task parks after a connection error until it receives
//! a reconnect request, so there is never more than one reconnect attempt in
//! flight per thing. Consecutive failures back off exponentially; a
//! successful handshake resets the backoff.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use crate::config::{ReconnectSettings, TlsSettings};
use crate::outcome::{FailureKind, OutcomeSink, REQUEST_TYPE};
use crate::session::{ProtocolSession, SessionCallbacks};
use crate::tracker::record::elapsed_ms_between;

pub const CONNECT_LABEL: &str = "connect";
pub const DISCONNECT_LABEL: &str = "disconnect";
pub const TLS_LABEL: &str = "tls_set";

pub struct ConnectionSupervisor {
    session: Arc<dyn ProtocolSession>,
    sink: Arc<dyn OutcomeSink>,
    backoff: Backoff,
}

impl ConnectionSupervisor {
    pub fn new(
        session: Arc<dyn ProtocolSession>,
        sink: Arc<dyn OutcomeSink>,
        settings: &ReconnectSettings,
    ) -> Self {
        Self {
            session,
            sink,
            backoff: Backoff::from_settings(settings),
        }
    }

    /// Starts connecting to `host:port` and launches the session's I/O task.
    ///
    /// Returns `false` after reporting a `connect` failure when either step
    /// fails synchronously; the handshake result arrives later through
    /// [`handle_connected`](Self::handle_connected) or
    /// [`handle_disconnected`](Self::handle_disconnected).
    pub fn connect(&self, host: &str, port: u16, callbacks: Arc<dyn SessionCallbacks>) -> bool {
        let start_time = Instant::now();
        let result = self
            .session
            .connect_async(host, port)
            .and_then(|()| self.session.start_io_loop(callbacks));

        match result {
            Ok(()) => {
                debug!("connecting to {}:{}", host, port);
                true
            }
            Err(e) => {
                let elapsed = elapsed_ms_between(start_time, Instant::now());
                error!("connect to {}:{} failed: {}", host, port, e);
                self.sink
                    .report_failure(REQUEST_TYPE, CONNECT_LABEL, elapsed, FailureKind::Connect(e), 0);
                false
            }
        }
    }

    pub fn configure_tls(&self, tls: &TlsSettings) -> bool {
        let start_time = Instant::now();
        match self.session.configure_tls(tls) {
            Ok(()) => true,
            Err(e) => {
                let elapsed = elapsed_ms_between(start_time, Instant::now());
                error!("tls setup failed: {}", e);
                self.sink
                    .report_failure(REQUEST_TYPE, TLS_LABEL, elapsed, FailureKind::TlsConfig(e), 0);
                false
            }
        }
    }

    pub fn handle_connected(&self) {
        let attempts = self.backoff.attempts();
        if attempts > 0 {
            info!("reconnected after {} attempt(s)", attempts);
        }
        self.backoff.reset();
        self.sink.report_success(REQUEST_TYPE, CONNECT_LABEL, 0, 0);
    }

    /// Reports the disconnect and requests exactly one reconnect.
    pub fn handle_disconnected(&self, reason: &str) {
        self.sink.report_failure(
            REQUEST_TYPE,
            DISCONNECT_LABEL,
            0,
            FailureKind::Disconnected(reason.to_string()),
            0,
        );

        let delay = self.backoff.next_delay();
        debug!("reconnect requested in {:?}", delay);
        if let Err(e) = self.session.reconnect(delay) {
            warn!("reconnect request failed: {}", e);
        }
    }

    /// Closes the session on purpose; no disconnect event is reported.
    pub fn disconnect(&self) {
        if let Err(e) = self.session.disconnect() {
            debug!("disconnect: {}", e);
        }
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("backoff", &self.backoff)
            .finish()
    }
}
