use std::collections::{HashMap, HashSet};

use tokio::time::Instant;

use super::record::{CorrelationId, OperationRecord};

/// Result of consuming an acknowledgment against a [`PendingTable`].
#[derive(Debug)]
pub enum Lookup {
    /// The live record, now removed from the table.
    Found(OperationRecord),
    /// The record was already swept as timed out; the late ack is absorbed.
    Expired,
    /// No record and no tombstone for this id.
    Missing,
}

/// In-flight operations keyed by correlation id.
///
/// Each record is consumed at most once, either by [`pop`](Self::pop) or by
/// [`drain_expired`](Self::drain_expired). Swept ids leave a tombstone
/// behind until the id is acknowledged or reused.
#[derive(Debug, Default)]
pub struct PendingTable {
    records: HashMap<CorrelationId, OperationRecord>,
    expired: HashSet<CorrelationId>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` under `id`, returning a still-live record the id
    /// displaced, if any.
    pub fn insert(&mut self, id: CorrelationId, record: OperationRecord) -> Option<OperationRecord> {
        self.expired.remove(&id);
        self.records.insert(id, record)
    }

    pub fn pop(&mut self, id: CorrelationId) -> Lookup {
        if let Some(record) = self.records.remove(&id) {
            Lookup::Found(record)
        } else if self.expired.remove(&id) {
            Lookup::Expired
        } else {
            Lookup::Missing
        }
    }

    /// Removes every record whose timeout has elapsed at `now`.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<(CorrelationId, OperationRecord)> {
        let ids: Vec<CorrelationId> = self
            .records
            .iter()
            .filter(|(_, record)| record.timed_out(record.elapsed_ms(now)))
            .map(|(id, _)| *id)
            .collect();

        let mut drained = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.records.remove(&id) {
                self.expired.insert(id);
                drained.push((id, record));
            }
        }
        drained
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
