use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rumqttc::QoS;
use tokio::time::{Instant, advance};

use super::*;
use crate::outcome::{FailureKind, MemorySink};
use crate::session::mock::MockSession;
use crate::session::{ProtocolSession, SessionCallbacks};
use crate::utils::SessionError;

const PAYLOAD: &[u8] = b"{\"id\":\"0\"}";

struct TrackerCallbacks(Arc<OperationTracker>);

impl SessionCallbacks for TrackerCallbacks {
    fn on_connected(&self) {}
    fn on_disconnected(&self, _reason: &str) {}
    fn on_publish_acked(&self, id: CorrelationId) {
        self.0.publish_acked(id);
    }
    fn on_subscribe_acked(&self, id: CorrelationId, granted: Option<QoS>) {
        self.0.subscribe_acked(id, granted);
    }
}

fn tracker_for(session: &Arc<MockSession>) -> (Arc<OperationTracker>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let tracker = Arc::new(OperationTracker::new(session.clone(), sink.clone()));
    (tracker, sink)
}

fn last_published_id(session: &MockSession) -> CorrelationId {
    session.published.lock().last().unwrap().0
}

fn last_subscribed_id(session: &MockSession) -> CorrelationId {
    session.subscribed.lock().last().unwrap().0
}

fn p1() -> PublishOptions {
    PublishOptions::default()
        .with_label("p1")
        .with_timeout_ms(1000)
}

#[test]
fn test_timed_out_rule() {
    let cases = [
        (0, 0, false),
        (0, u64::MAX, false),
        (1000, 999, false),
        (1000, 1000, false),
        (1000, 1001, true),
        (1, 50, true),
    ];
    for (timeout_ms, elapsed, expected) in cases {
        let record = OperationRecord::publish("t", Vec::new(), QoS::AtMostOnce, "l", timeout_ms, Instant::now());
        assert_eq!(
            record.timed_out(elapsed),
            expected,
            "timeout {timeout_ms} elapsed {elapsed}"
        );
    }
}

#[test]
fn test_record_response_size() {
    let now = Instant::now();
    let publish = OperationRecord::publish("t", PAYLOAD.to_vec(), QoS::AtMostOnce, "l", 0, now);
    let subscribe = OperationRecord::subscribe("t", QoS::AtMostOnce, "l", 0, now);
    assert_eq!(publish.response_size(), PAYLOAD.len());
    assert_eq!(subscribe.response_size(), 0);
    assert_eq!(subscribe.kind, OperationKind::Subscribe);
}

#[test]
fn test_default_options() {
    let publish = PublishOptions::default();
    assert_eq!(publish.qos, QoS::AtMostOnce);
    assert_eq!(publish.timeout_ms, 10_000);
    assert_eq!(publish.label, "publish");

    let subscribe = SubscribeOptions::default();
    assert_eq!(subscribe.timeout_ms, 15_000);
    assert_eq!(subscribe.label, "subscribe");
}

#[tokio::test(start_paused = true)]
async fn test_publish_acked_within_timeout_reports_success() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    tracker.publish("sensors/1", PAYLOAD.to_vec(), p1());
    assert_eq!(tracker.pending_publishes(), 1);
    let (_, topic, payload, qos) = session.published.lock()[0].clone();
    assert_eq!(topic, "sensors/1");
    assert_eq!(payload, PAYLOAD);
    assert_eq!(qos, QoS::AtMostOnce);

    advance(Duration::from_millis(50)).await;
    tracker.publish_acked(last_published_id(&session));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].is_success());
    assert_eq!(events[0].label, "p1");
    assert_eq!(events[0].elapsed_ms, 50);
    assert_eq!(events[0].response_size, PAYLOAD.len());
    assert_eq!(tracker.pending_publishes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_publish_acked_after_timeout_reports_timeout() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    tracker.publish("sensors/1", PAYLOAD.to_vec(), p1());
    advance(Duration::from_millis(1500)).await;
    tracker.publish_acked(last_published_id(&session));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label, "p1");
    assert_eq!(events[0].elapsed_ms, 1500);
    assert_eq!(
        events[0].failure_kind(),
        Some(&FailureKind::Timeout(OperationKind::Publish))
    );
}

#[test]
fn test_second_ack_for_same_id_is_an_anomaly() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    tracker.publish("sensors/1", PAYLOAD.to_vec(), p1());
    let id = last_published_id(&session);
    tracker.publish_acked(id);
    tracker.publish_acked(id);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(events[0].is_success());
    assert_eq!(events[1].label, RECORD_NOT_FOUND_LABEL);
    assert_eq!(events[1].elapsed_ms, 0);
    assert_eq!(
        events[1].failure_kind(),
        Some(&FailureKind::RecordNotFound(OperationKind::Publish))
    );
}

#[test]
fn test_unknown_publish_ack_reports_one_anomaly() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    tracker.publish_acked(4242);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label, RECORD_NOT_FOUND_LABEL);
    assert_eq!(events[0].response_size, 0);
}

#[test]
fn test_unknown_subscribe_ack_is_silent() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    tracker.subscribe_acked(4242, Some(QoS::AtMostOnce));

    assert!(sink.is_empty());
}

#[test]
fn test_publish_submission_error_stores_no_record() {
    let session = MockSession::new();
    session.fail_submissions(SessionError::NotConnected);
    let (tracker, sink) = tracker_for(&session);

    tracker.publish("sensors/1", PAYLOAD.to_vec(), p1());

    assert_eq!(tracker.pending_publishes(), 0);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label, "p1");
    assert_eq!(
        events[0].failure_kind(),
        Some(&FailureKind::Transport(SessionError::NotConnected))
    );
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_success_reports_zero_size() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    tracker.subscribe("commands/#", SubscribeOptions::default().with_label("s1"));
    assert_eq!(tracker.pending_subscribes(), 1);
    advance(Duration::from_millis(20)).await;
    tracker.subscribe_acked(last_subscribed_id(&session), Some(QoS::AtMostOnce));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].is_success());
    assert_eq!(events[0].label, "s1");
    assert_eq!(events[0].elapsed_ms, 20);
    assert_eq!(events[0].response_size, 0);
    assert_eq!(tracker.pending_subscribes(), 0);
}

#[test]
fn test_subscribe_rejected_by_broker() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    tracker.subscribe("commands/#", SubscribeOptions::default());
    tracker.subscribe_acked(last_subscribed_id(&session), None);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].failure_kind(), Some(&FailureKind::SubscribeRejected));
}

#[test]
fn test_subscribe_submission_error_reports_failure() {
    let session = MockSession::new();
    session.fail_submissions(SessionError::QueueFull);
    let (tracker, sink) = tracker_for(&session);

    tracker.subscribe("commands/#", SubscribeOptions::default());

    assert_eq!(tracker.pending_subscribes(), 0);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label, "subscribe");
    assert_eq!(
        events[0].failure_kind(),
        Some(&FailureKind::Transport(SessionError::QueueFull))
    );
}

#[tokio::test(start_paused = true)]
async fn test_sweep_expires_orphans_and_absorbs_late_ack() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    tracker.publish("sensors/1", PAYLOAD.to_vec(), p1());
    let id = last_published_id(&session);
    tracker.subscribe("commands/#", SubscribeOptions::default().with_timeout_ms(5000));

    advance(Duration::from_millis(1200)).await;
    assert_eq!(tracker.sweep_expired(), 1);
    assert_eq!(tracker.pending_publishes(), 0);
    assert_eq!(tracker.pending_subscribes(), 1);

    let events = sink.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label, "p1");
    assert_eq!(events[0].elapsed_ms, 1200);
    assert_eq!(
        events[0].failure_kind(),
        Some(&FailureKind::Timeout(OperationKind::Publish))
    );

    // the broker finally answers: no second event for the same operation
    tracker.publish_acked(id);
    assert!(sink.is_empty());

    // the tombstone is consumed, a further ack is an anomaly again
    tracker.publish_acked(id);
    assert_eq!(sink.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_ignores_operations_without_timeout() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    tracker.publish("sensors/1", PAYLOAD.to_vec(), p1().with_timeout_ms(0));
    advance(Duration::from_secs(3600)).await;

    assert_eq!(tracker.sweep_expired(), 0);
    assert_eq!(tracker.pending_publishes(), 1);
    assert!(sink.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_task_reports_timeouts() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    tracker.publish("sensors/1", PAYLOAD.to_vec(), p1());

    let sweeper = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.run_sweeper(Duration::from_millis(250)).await })
    };

    tokio::time::sleep(Duration::from_millis(1600)).await;
    sweeper.abort();

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].failure_kind(),
        Some(&FailureKind::Timeout(OperationKind::Publish))
    );
    assert!(events[0].elapsed_ms > 1000);
}

#[test]
fn test_reused_id_displaces_stale_record() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    session.set_next_id(9);
    tracker.publish("sensors/1", PAYLOAD.to_vec(), p1());
    session.set_next_id(9);
    tracker.publish("sensors/2", PAYLOAD.to_vec(), p1().with_label("p2"));

    let events = sink.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label, "p1");
    assert_eq!(
        events[0].failure_kind(),
        Some(&FailureKind::IdentifierReused(OperationKind::Publish))
    );

    tracker.publish_acked(9);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label, "p2");
    assert!(events[0].is_success());
}

#[test]
fn test_ack_racing_registration_finds_record() {
    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);
    session
        .start_io_loop(Arc::new(TrackerCallbacks(tracker.clone())))
        .unwrap();
    session.ack_publishes_immediately();

    for i in 0..50 {
        tracker.publish("sensors/1", PAYLOAD.to_vec(), p1().with_label(format!("p{i}")));
    }
    session.join_io_threads();

    let events = sink.events();
    assert_eq!(events.len(), 50);
    assert!(events.iter().all(|e| e.is_success()), "{events:?}");
    assert_eq!(tracker.pending_publishes(), 0);
}

#[test]
fn test_concurrent_publishes_resolve_exactly_once() {
    const CALLERS: usize = 16;
    const PER_CALLER: usize = 25;

    let session = MockSession::new();
    let (tracker, sink) = tracker_for(&session);

    let callers: Vec<_> = (0..CALLERS)
        .map(|c| {
            let tracker = tracker.clone();
            thread::spawn(move || {
                for n in 0..PER_CALLER {
                    let payload = format!("{{\"id\":\"{c}-{n}\"}}");
                    tracker.publish(
                        "sensors/1",
                        payload,
                        PublishOptions::default().with_label(format!("p{c}-{n}")),
                    );
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }
    assert_eq!(tracker.pending_publishes(), CALLERS * PER_CALLER);

    // deliver the acks out of order, from several threads
    let mut ids: Vec<CorrelationId> = session.published.lock().iter().map(|p| p.0).collect();
    ids.reverse();
    let ackers: Vec<_> = ids
        .chunks(ids.len() / 4)
        .map(|chunk| {
            let tracker = tracker.clone();
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                for id in chunk.into_iter().rev() {
                    tracker.publish_acked(id);
                }
            })
        })
        .collect();
    for acker in ackers {
        acker.join().unwrap();
    }

    let events = sink.events();
    assert_eq!(events.len(), CALLERS * PER_CALLER);
    assert!(events.iter().all(|e| e.is_success()));
    let labels: HashSet<_> = events.iter().map(|e| e.label.clone()).collect();
    assert_eq!(labels.len(), CALLERS * PER_CALLER);
    assert_eq!(tracker.pending_publishes(), 0);
}

#[test]
fn test_pending_table_pop_is_one_shot() {
    let mut table = PendingTable::new();
    let record = OperationRecord::subscribe("t", QoS::AtMostOnce, "l", 0, Instant::now());
    assert!(table.insert(1, record).is_none());
    assert!(table.contains(1));

    assert!(matches!(table.pop(1), Lookup::Found(_)));
    assert!(matches!(table.pop(1), Lookup::Missing));
    assert!(table.is_empty());
}
