//! In-process [`ProtocolSession`] used by the crate's tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::QoS;

use super::{ProtocolSession, SessionCallbacks};
use crate::config::TlsSettings;
use crate::tracker::CorrelationId;
use crate::utils::SessionError;

#[derive(Default)]
pub(crate) struct MockSession {
    next_id: Mutex<CorrelationId>,
    pub submit_error: Mutex<Option<SessionError>>,
    pub connect_error: Mutex<Option<SessionError>>,
    pub tls_error: Mutex<Option<SessionError>>,
    pub published: Mutex<Vec<(CorrelationId, String, Vec<u8>, QoS)>>,
    pub subscribed: Mutex<Vec<(CorrelationId, String, QoS)>>,
    pub connects: Mutex<Vec<(String, u16)>>,
    pub reconnects: Mutex<Vec<Duration>>,
    pub disconnects: Mutex<usize>,
    callbacks: Mutex<Option<Arc<dyn SessionCallbacks>>>,
    ack_from_io_thread: AtomicBool,
    io_threads: Mutex<Vec<JoinHandle<()>>>,
    connected: AtomicBool,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        let session = Self::default();
        session.connected.store(true, Ordering::SeqCst);
        Arc::new(session)
    }

    pub fn set_next_id(&self, id: CorrelationId) {
        *self.next_id.lock() = id;
    }

    pub fn fail_submissions(&self, error: SessionError) {
        *self.submit_error.lock() = Some(error);
    }

    /// Every accepted publish is acked right away from a separate thread,
    /// the way a QoS 0 send can complete before `submit_publish` returns.
    pub fn ack_publishes_immediately(&self) {
        self.ack_from_io_thread.store(true, Ordering::SeqCst);
    }

    pub fn join_io_threads(&self) {
        let handles: Vec<_> = self.io_threads.lock().drain(..).collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    pub fn callbacks(&self) -> Option<Arc<dyn SessionCallbacks>> {
        self.callbacks.lock().clone()
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.lock().len()
    }

    fn allocate(&self) -> Result<CorrelationId, SessionError> {
        if let Some(e) = self.submit_error.lock().clone() {
            return Err(e);
        }
        let mut next = self.next_id.lock();
        let id = *next;
        *next = next.wrapping_add(1);
        Ok(id)
    }
}

impl ProtocolSession for MockSession {
    fn submit_publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<CorrelationId, SessionError> {
        let id = self.allocate()?;
        self.published
            .lock()
            .push((id, topic.to_string(), payload.to_vec(), qos));

        if self.ack_from_io_thread.load(Ordering::SeqCst) {
            if let Some(callbacks) = self.callbacks() {
                let handle = std::thread::spawn(move || callbacks.on_publish_acked(id));
                self.io_threads.lock().push(handle);
            }
        }
        Ok(id)
    }

    fn submit_subscribe(&self, topic: &str, qos: QoS) -> Result<CorrelationId, SessionError> {
        let id = self.allocate()?;
        self.subscribed.lock().push((id, topic.to_string(), qos));
        Ok(id)
    }

    fn connect_async(&self, host: &str, port: u16) -> Result<(), SessionError> {
        if let Some(e) = self.connect_error.lock().clone() {
            return Err(e);
        }
        self.connects.lock().push((host.to_string(), port));
        Ok(())
    }

    fn start_io_loop(&self, callbacks: Arc<dyn SessionCallbacks>) -> Result<(), SessionError> {
        let mut slot = self.callbacks.lock();
        if slot.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        *slot = Some(callbacks);
        Ok(())
    }

    fn reconnect(&self, delay: Duration) -> Result<(), SessionError> {
        self.reconnects.lock().push(delay);
        Ok(())
    }

    fn configure_tls(&self, _tls: &TlsSettings) -> Result<(), SessionError> {
        match self.tls_error.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn disconnect(&self) -> Result<(), SessionError> {
        *self.disconnects.lock() += 1;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
