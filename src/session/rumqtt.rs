//! rumqttc-backed protocol session
//!
//! `connect_async` builds the rumqttc client and event loop; `start_io_loop`
//! moves the event loop onto a dedicated tokio task which polls it and
//! translates its events into [`SessionCallbacks`] calls.
//!
//! After a connection error the I/O task reports the disconnect and parks
//! until a reconnect is requested. rumqttc dials the broker again on the
//! next poll, so resuming the loop is the reconnect.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ClientError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode, Transport,
};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::correlator::Correlator;
use super::{ProtocolSession, SessionCallbacks};
use crate::config::{BrokerSettings, TlsSettings};
use crate::tracker::CorrelationId;
use crate::utils::SessionError;

const DISCONNECT_FLUSH: Duration = Duration::from_millis(500);

/// State shared between the session handle and its I/O task.
#[derive(Debug, Default)]
pub(super) struct Shared {
    pub(super) correlator: Mutex<Correlator>,
    pub(super) connected: AtomicBool,
    closing: AtomicBool,
    shutdown: Notify,
}

pub struct RumqttSession {
    client_id: String,
    broker: BrokerSettings,
    transport: Mutex<Option<Transport>>,
    client: Mutex<Option<AsyncClient>>,
    eventloop: Mutex<Option<EventLoop>>,
    reconnect_tx: UnboundedSender<Duration>,
    reconnect_rx: Mutex<Option<UnboundedReceiver<Duration>>>,
    io_task: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl RumqttSession {
    pub fn new(client_id: impl Into<String>, broker: BrokerSettings) -> Self {
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();
        Self {
            client_id: client_id.into(),
            broker,
            transport: Mutex::new(None),
            client: Mutex::new(None),
            eventloop: Mutex::new(None),
            reconnect_tx,
            reconnect_rx: Mutex::new(Some(reconnect_rx)),
            io_task: Mutex::new(None),
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Operations handed to rumqttc that have not completed yet.
    pub fn outstanding(&self) -> usize {
        self.shared.correlator.lock().outstanding()
    }

    fn connected_client(&self) -> Result<AsyncClient, SessionError> {
        let client = self.client.lock().clone().ok_or(SessionError::NotConnected)?;
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(SessionError::NotConnected);
        }
        Ok(client)
    }
}

fn client_error(e: ClientError) -> SessionError {
    match e {
        ClientError::TryRequest(_) => SessionError::QueueFull,
        ClientError::Request(_) => SessionError::Rejected("request channel closed".to_string()),
    }
}

fn read_pem(path: &str, what: &str) -> Result<Vec<u8>, SessionError> {
    fs::read(path).map_err(|e| SessionError::Tls(format!("failed to read {what} from {path}: {e}")))
}

pub(crate) fn build_tls_transport(tls: &TlsSettings) -> Result<Transport, SessionError> {
    if let Some(version) = tls.tls_version.as_deref() {
        match version.to_ascii_lowercase().as_str() {
            "tlsv1.2" | "tlsv1.3" | "1.2" | "1.3" => {}
            other => return Err(SessionError::Tls(format!("unsupported protocol version {other}"))),
        }
    }
    if tls.ciphers.as_deref().is_some_and(|c| !c.trim().is_empty()) {
        return Err(SessionError::Tls(
            "explicit cipher lists are not supported by the rustls transport".to_string(),
        ));
    }

    let client_auth = match (&tls.client_cert_path, &tls.client_key_path) {
        (Some(cert), Some(key)) => Some((read_pem(cert, "client certificate")?, read_pem(key, "client key")?)),
        (None, None) => None,
        _ => {
            return Err(SessionError::Tls(
                "client certificate and key must be configured together".to_string(),
            ));
        }
    };

    let alpn = (!tls.alpn.is_empty()).then(|| tls.alpn.iter().map(|p| p.as_bytes().to_vec()).collect());

    match &tls.ca_path {
        Some(ca_path) => Ok(Transport::tls(read_pem(ca_path, "CA certificate")?, client_auth, alpn)),
        None if client_auth.is_none() => Ok(Transport::tls_with_default_config()),
        None => Err(SessionError::Tls(
            "client authentication requires a CA certificate".to_string(),
        )),
    }
}

impl ProtocolSession for RumqttSession {
    fn submit_publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<CorrelationId, SessionError> {
        if !rumqttc::valid_topic(topic) {
            return Err(SessionError::Rejected(format!("invalid topic name '{topic}'")));
        }
        let client = self.connected_client()?;

        // Hold the correlator across try_publish so queue order matches id order.
        let mut correlator = self.shared.correlator.lock();
        let id = correlator.queue_publish(qos);
        if let Err(e) = client.try_publish(topic, qos, false, payload.to_vec()) {
            correlator.unqueue_last_publish();
            return Err(client_error(e));
        }
        Ok(id)
    }

    fn submit_subscribe(&self, topic: &str, qos: QoS) -> Result<CorrelationId, SessionError> {
        if !rumqttc::valid_filter(topic) {
            return Err(SessionError::Rejected(format!("invalid topic filter '{topic}'")));
        }
        let client = self.connected_client()?;

        let mut correlator = self.shared.correlator.lock();
        let id = correlator.queue_subscribe();
        if let Err(e) = client.try_subscribe(topic, qos) {
            correlator.unqueue_last_subscribe();
            return Err(client_error(e));
        }
        Ok(id)
    }

    fn connect_async(&self, host: &str, port: u16) -> Result<(), SessionError> {
        if self.client_id.is_empty() || self.client_id.starts_with(' ') {
            return Err(SessionError::Rejected(format!("invalid client id '{}'", self.client_id)));
        }
        if host.is_empty() {
            return Err(SessionError::Rejected("empty broker host".to_string()));
        }

        let mut options = MqttOptions::new(&self.client_id, host, port);
        options
            .set_keep_alive(Duration::from_secs(self.broker.keep_alive_secs))
            .set_clean_session(self.broker.clean_session);
        if let Some(username) = &self.broker.username {
            options.set_credentials(username, self.broker.password.clone().unwrap_or_default());
        }
        if let Some(transport) = self.transport.lock().clone() {
            options.set_transport(transport);
        }

        let (client, eventloop) = AsyncClient::new(options, self.broker.request_capacity.max(1));
        *self.client.lock() = Some(client);
        *self.eventloop.lock() = Some(eventloop);
        debug!("{} prepared connection to {}:{}", self.client_id, host, port);
        Ok(())
    }

    fn start_io_loop(&self, callbacks: Arc<dyn SessionCallbacks>) -> Result<(), SessionError> {
        let handle = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let mut io_task = self.io_task.lock();
        if io_task.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        let eventloop = self.eventloop.lock().take().ok_or(SessionError::NotConnected)?;
        let reconnects = self.reconnect_rx.lock().take().ok_or(SessionError::AlreadyStarted)?;

        let shared = self.shared.clone();
        let client_id = self.client_id.clone();
        *io_task = Some(handle.spawn(io_loop(client_id, eventloop, shared, reconnects, callbacks)));
        Ok(())
    }

    fn reconnect(&self, delay: Duration) -> Result<(), SessionError> {
        self.reconnect_tx
            .send(delay)
            .map_err(|_| SessionError::Msg("i/o loop has stopped".to_string()))
    }

    fn configure_tls(&self, tls: &TlsSettings) -> Result<(), SessionError> {
        let transport = build_tls_transport(tls)?;
        *self.transport.lock() = Some(transport);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), SessionError> {
        self.shared.closing.store(true, Ordering::Release);
        let result = match self.client.lock().as_ref() {
            Some(client) => client.try_disconnect().map_err(client_error),
            None => Ok(()),
        };
        self.shared.shutdown.notify_one();
        result
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }
}

impl Drop for RumqttSession {
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::Release);
        self.shared.shutdown.notify_one();
    }
}

impl std::fmt::Debug for RumqttSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RumqttSession")
            .field("client_id", &self.client_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn io_loop(
    client_id: String,
    mut eventloop: EventLoop,
    shared: Arc<Shared>,
    mut reconnects: UnboundedReceiver<Duration>,
    callbacks: Arc<dyn SessionCallbacks>,
) {
    loop {
        let polled = tokio::select! {
            polled = eventloop.poll() => polled,
            _ = shared.shutdown.notified() => break,
        };

        match polled {
            Ok(event) => dispatch(&shared, event, callbacks.as_ref()),
            Err(e) => {
                shared.connected.store(false, Ordering::Release);
                if shared.closing.load(Ordering::Acquire) {
                    break;
                }
                warn!("{} connection error: {}", client_id, e);
                let dropped = shared.correlator.lock().connection_lost();
                if !dropped.is_empty() {
                    debug!("{} subscribe(s) {:?} lost with the connection", client_id, dropped);
                }
                callbacks.on_disconnected(&e.to_string());

                let delay = tokio::select! {
                    delay = reconnects.recv() => match delay {
                        Some(delay) => delay,
                        None => break,
                    },
                    _ = shared.shutdown.notified() => break,
                };
                // coalesce requests that piled up while parked
                while reconnects.try_recv().is_ok() {}

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shared.shutdown.notified() => break,
                }
                debug!("{} reconnecting after {:?}", client_id, delay);
            }
        }
    }
    if shared.closing.load(Ordering::Acquire) && shared.connected.load(Ordering::Acquire) {
        // let the queued DISCONNECT reach the broker
        let flushed = tokio::time::timeout(DISCONNECT_FLUSH, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            debug!("{} disconnect not flushed within {:?}", client_id, DISCONNECT_FLUSH);
        }
    }
    shared.connected.store(false, Ordering::Release);
    info!("{} i/o loop stopped", client_id);
}

pub(super) fn dispatch(shared: &Shared, event: Event, callbacks: &dyn SessionCallbacks) {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            debug!("connack {:?}", ack.code);
            shared.connected.store(true, Ordering::Release);
            callbacks.on_connected();
        }
        Event::Outgoing(Outgoing::Publish(pkid)) => {
            let completed = shared.correlator.lock().publish_sent(pkid);
            if let Some(id) = completed {
                callbacks.on_publish_acked(id);
            }
        }
        Event::Incoming(Packet::PubAck(ack)) => {
            let completed = shared.correlator.lock().publish_confirmed(ack.pkid);
            if let Some(id) = completed {
                callbacks.on_publish_acked(id);
            }
        }
        Event::Incoming(Packet::PubComp(comp)) => {
            let completed = shared.correlator.lock().publish_confirmed(comp.pkid);
            if let Some(id) = completed {
                callbacks.on_publish_acked(id);
            }
        }
        Event::Outgoing(Outgoing::Subscribe(pkid)) => {
            shared.correlator.lock().subscribe_sent(pkid);
        }
        Event::Incoming(Packet::SubAck(ack)) => {
            let granted = ack.return_codes.first().and_then(|code| match code {
                SubscribeReasonCode::Success(qos) => Some(*qos),
                SubscribeReasonCode::Failure => None,
            });
            let completed = shared.correlator.lock().subscribe_acked(ack.pkid);
            if let Some(id) = completed {
                callbacks.on_subscribe_acked(id, granted);
            }
        }
        other => trace!("event {:?}", other),
    }
}
