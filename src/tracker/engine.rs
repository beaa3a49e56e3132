//! Operation tracker
//!
//! Submits publish/subscribe requests to a [`ProtocolSession`], keeps one
//! [`OperationRecord`] per accepted submission and resolves it when the
//! session's I/O task reports the acknowledgment.
//!
//! Concurrency notes:
//! - The tracker is shared between every caller issuing operations and the
//!   session's I/O task delivering acknowledgments. Each table sits behind
//!   its own mutex.
//! - Submission happens while the table lock is held and the record is
//!   inserted before the lock is released. An acknowledgment for that id has
//!   to take the same lock, so it always finds the record, even for QoS 0
//!   publishes that complete as soon as they leave the client.
//! - Outcome events are emitted after the table lock has been released.
//! - Nothing here returns an error to the caller; every failure becomes an
//!   outcome event.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::QoS;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::pending::{Lookup, PendingTable};
use super::record::{CorrelationId, OperationKind, OperationRecord, elapsed_ms_between};
use crate::outcome::{FailureKind, OutcomeSink, REQUEST_TYPE};
use crate::session::ProtocolSession;

/// Label of the anomaly reported when a publish ack matches no record.
pub const RECORD_NOT_FOUND_LABEL: &str = "record_not_found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: QoS,
    pub label: String,
    pub timeout_ms: u64,
}

impl PublishOptions {
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            qos: QoS::AtMostOnce,
            label: "publish".to_string(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub qos: QoS,
    pub label: String,
    pub timeout_ms: u64,
}

impl SubscribeOptions {
    pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            qos: QoS::AtMostOnce,
            label: "subscribe".to_string(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }
}

pub struct OperationTracker {
    session: Arc<dyn ProtocolSession>,
    sink: Arc<dyn OutcomeSink>,
    publishes: Mutex<PendingTable>,
    subscribes: Mutex<PendingTable>,
}

impl OperationTracker {
    pub fn new(session: Arc<dyn ProtocolSession>, sink: Arc<dyn OutcomeSink>) -> Self {
        Self {
            session,
            sink,
            publishes: Mutex::new(PendingTable::new()),
            subscribes: Mutex::new(PendingTable::new()),
        }
    }

    /// Publishes `payload` to `topic`. Latency is reported once the session
    /// acknowledges the returned correlation id.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>, options: PublishOptions) {
        let payload = payload.into();
        let start_time = Instant::now();

        let (submitted, displaced) = {
            let mut table = self.publishes.lock();
            match self.session.submit_publish(topic, &payload, options.qos) {
                Ok(id) => {
                    let record = OperationRecord::publish(
                        topic,
                        payload,
                        options.qos,
                        &options.label,
                        options.timeout_ms,
                        start_time,
                    );
                    (Ok(id), table.insert(id, record))
                }
                Err(e) => (Err(e), None),
            }
        };

        match submitted {
            Ok(id) => trace!("publish {} submitted to {} as id {}", options.label, topic, id),
            Err(e) => {
                let elapsed = elapsed_ms_between(start_time, Instant::now());
                warn!("publish {} to {} failed: {}", options.label, topic, e);
                self.sink
                    .report_failure(REQUEST_TYPE, &options.label, elapsed, FailureKind::Transport(e), 0);
            }
        }

        if let Some(record) = displaced {
            self.report_displaced(record);
        }
    }

    /// Subscribes to `topic`. Latency is reported once the broker's SUBACK
    /// for the returned correlation id arrives.
    pub fn subscribe(&self, topic: &str, options: SubscribeOptions) {
        let start_time = Instant::now();

        let (submitted, displaced) = {
            let mut table = self.subscribes.lock();
            match self.session.submit_subscribe(topic, options.qos) {
                Ok(id) => {
                    let record = OperationRecord::subscribe(
                        topic,
                        options.qos,
                        &options.label,
                        options.timeout_ms,
                        start_time,
                    );
                    (Ok(id), table.insert(id, record))
                }
                Err(e) => (Err(e), None),
            }
        };

        match submitted {
            Ok(id) => debug!("subscribe {} to {} submitted as id {}", options.label, topic, id),
            Err(e) => {
                let elapsed = elapsed_ms_between(start_time, Instant::now());
                warn!("Exception when subscribing to topic {}: {}", topic, e);
                self.sink
                    .report_failure(REQUEST_TYPE, &options.label, elapsed, FailureKind::Transport(e), 0);
            }
        }

        if let Some(record) = displaced {
            self.report_displaced(record);
        }
    }

    /// Resolves the publish registered under `id`.
    ///
    /// Each id resolves at most once; an ack nobody is waiting for is
    /// reported as a `record_not_found` anomaly with zero latency.
    pub fn publish_acked(&self, id: CorrelationId) {
        let end_time = Instant::now();
        let lookup = self.publishes.lock().pop(id);

        match lookup {
            Lookup::Found(record) => self.resolve(record, end_time),
            Lookup::Expired => debug!("late publish ack for id {} absorbed after timeout", id),
            Lookup::Missing => {
                warn!("Published message could not be found for id {}", id);
                self.sink.report_failure(
                    REQUEST_TYPE,
                    RECORD_NOT_FOUND_LABEL,
                    0,
                    FailureKind::RecordNotFound(OperationKind::Publish),
                    0,
                );
            }
        }
    }

    /// Resolves the subscribe registered under `id`. `granted` is `None` when
    /// the broker refused the subscription. Unknown ids are only logged.
    pub fn subscribe_acked(&self, id: CorrelationId, granted: Option<QoS>) {
        let end_time = Instant::now();
        let lookup = self.subscribes.lock().pop(id);

        match lookup {
            Lookup::Found(record) => match granted {
                Some(qos) => {
                    debug!("subscription {} granted at {:?}", record.topic, qos);
                    self.resolve(record, end_time);
                }
                None => {
                    let elapsed = record.elapsed_ms(end_time);
                    warn!("subscription to {} rejected by broker", record.topic);
                    self.sink.report_failure(
                        REQUEST_TYPE,
                        &record.label,
                        elapsed,
                        FailureKind::SubscribeRejected,
                        0,
                    );
                }
            },
            Lookup::Expired => debug!("late subscribe ack for id {} absorbed after timeout", id),
            Lookup::Missing => info!("Not found record for subscribe ack id {}", id),
        }
    }

    /// Removes every record whose timeout has passed and reports each one as
    /// a timeout. Returns how many were swept.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut expired = self.publishes.lock().drain_expired(now);
        expired.extend(self.subscribes.lock().drain_expired(now));

        for (id, record) in &expired {
            let elapsed = record.elapsed_ms(now);
            debug!("{} {} (id {}) expired after {} ms", record.kind, record.label, id, elapsed);
            self.sink.report_failure(
                REQUEST_TYPE,
                &record.label,
                elapsed,
                FailureKind::Timeout(record.kind),
                0,
            );
        }
        expired.len()
    }

    /// Sweeps expired records every `interval`, forever.
    pub async fn run_sweeper(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let swept = self.sweep_expired();
            if swept > 0 {
                debug!("swept {} expired operations", swept);
            }
        }
    }

    pub fn pending_publishes(&self) -> usize {
        self.publishes.lock().len()
    }

    pub fn pending_subscribes(&self) -> usize {
        self.subscribes.lock().len()
    }

    fn resolve(&self, record: OperationRecord, end_time: Instant) {
        let elapsed = record.elapsed_ms(end_time);
        if record.timed_out(elapsed) {
            warn!("{} {} timed out after {} ms", record.kind, record.label, elapsed);
            self.sink.report_failure(
                REQUEST_TYPE,
                &record.label,
                elapsed,
                FailureKind::Timeout(record.kind),
                0,
            );
        } else {
            trace!("{} {} succeeded in {} ms", record.kind, record.label, elapsed);
            self.sink
                .report_success(REQUEST_TYPE, &record.label, elapsed, record.response_size());
        }
    }

    fn report_displaced(&self, record: OperationRecord) {
        let elapsed = record.elapsed_ms(Instant::now());
        warn!(
            "{} {} displaced before its acknowledgment arrived",
            record.kind, record.label
        );
        self.sink.report_failure(
            REQUEST_TYPE,
            &record.label,
            elapsed,
            FailureKind::IdentifierReused(record.kind),
            0,
        );
    }
}

impl std::fmt::Debug for OperationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationTracker")
            .field("pending_publishes", &self.pending_publishes())
            .field("pending_subscribes", &self.pending_subscribes())
            .finish()
    }
}
