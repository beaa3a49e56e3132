//! Correlation id bookkeeping
//!
//! rumqttc allocates packet ids inside its event loop, after the request has
//! left the caller, and QoS 0 publishes all carry packet id 0. The session
//! therefore hands out its own ids at submission time and matches them to
//! packet ids as the event loop reports outgoing packets. Requests travel
//! through a FIFO queue, so the n-th outgoing publish is the n-th accepted
//! publish submission.

use std::collections::{HashMap, VecDeque};

use rumqttc::QoS;

use crate::tracker::CorrelationId;

#[derive(Debug, Default)]
pub struct Correlator {
    next_id: CorrelationId,
    queued_publishes: VecDeque<(CorrelationId, QoS)>,
    queued_subscribes: VecDeque<CorrelationId>,
    inflight_publishes: HashMap<u16, CorrelationId>,
    inflight_subscribes: HashMap<u16, CorrelationId>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> CorrelationId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    pub fn queue_publish(&mut self, qos: QoS) -> CorrelationId {
        let id = self.allocate();
        self.queued_publishes.push_back((id, qos));
        id
    }

    /// Rolls back the most recent [`queue_publish`](Self::queue_publish)
    /// after the request could not be handed to the client.
    pub fn unqueue_last_publish(&mut self) {
        self.queued_publishes.pop_back();
    }

    pub fn queue_subscribe(&mut self) -> CorrelationId {
        let id = self.allocate();
        self.queued_subscribes.push_back(id);
        id
    }

    pub fn unqueue_last_subscribe(&mut self) {
        self.queued_subscribes.pop_back();
    }

    /// A publish left the client. Returns the id when this completes the
    /// operation (QoS 0).
    pub fn publish_sent(&mut self, pkid: u16) -> Option<CorrelationId> {
        // retransmission after reconnect
        if pkid != 0 && self.inflight_publishes.contains_key(&pkid) {
            return None;
        }
        let (id, qos) = self.queued_publishes.pop_front()?;
        match qos {
            QoS::AtMostOnce => Some(id),
            QoS::AtLeastOnce | QoS::ExactlyOnce => {
                self.inflight_publishes.insert(pkid, id);
                None
            }
        }
    }

    /// PUBACK (QoS 1) or PUBCOMP (QoS 2) arrived for `pkid`.
    pub fn publish_confirmed(&mut self, pkid: u16) -> Option<CorrelationId> {
        self.inflight_publishes.remove(&pkid)
    }

    /// A SUBSCRIBE left the client. Subscribes are never retransmitted, so
    /// a stale entry under the same packet id is replaced.
    pub fn subscribe_sent(&mut self, pkid: u16) {
        if let Some(id) = self.queued_subscribes.pop_front() {
            self.inflight_subscribes.insert(pkid, id);
        }
    }

    pub fn subscribe_acked(&mut self, pkid: u16) -> Option<CorrelationId> {
        self.inflight_subscribes.remove(&pkid)
    }

    /// The connection dropped. Subscribes already on the wire will never be
    /// answered; returns their ids.
    pub fn connection_lost(&mut self) -> Vec<CorrelationId> {
        self.inflight_subscribes.drain().map(|(_, id)| id).collect()
    }

    /// Operations accepted but not yet completed.
    pub fn outstanding(&self) -> usize {
        self.queued_publishes.len()
            + self.queued_subscribes.len()
            + self.inflight_publishes.len()
            + self.inflight_subscribes.len()
    }
}
