use tokio::sync::mpsc;

use super::entry::round_bucket;
use super::*;
use crate::outcome::{FailureKind, OutcomeEvent};
use crate::tracker::OperationKind;

fn success(label: &str, elapsed_ms: u64, size: usize) -> OutcomeEvent {
    OutcomeEvent::success(label, elapsed_ms, size)
}

fn timeout(label: &str, elapsed_ms: u64) -> OutcomeEvent {
    OutcomeEvent::failure(label, elapsed_ms, FailureKind::Timeout(OperationKind::Publish), 0)
}

#[test]
fn test_round_bucket() {
    assert_eq!(round_bucket(0), 0);
    assert_eq!(round_bucket(99), 99);
    assert_eq!(round_bucket(104), 100);
    assert_eq!(round_bucket(105), 110);
    assert_eq!(round_bucket(1_449), 1_400);
    assert_eq!(round_bucket(1_450), 1_500);
    assert_eq!(round_bucket(12_499), 12_000);
}

#[test]
fn test_request_stats_counts_and_latency() {
    let mut stats = RequestStats::new("publish:qos0:things");
    stats.log(&success("publish:qos0:things", 10, 10));
    stats.log(&success("publish:qos0:things", 30, 10));
    stats.log(&timeout("publish:qos0:things", 1500));

    assert_eq!(stats.num_requests, 3);
    assert_eq!(stats.num_failures, 1);
    assert_eq!(stats.min_response_time, Some(10));
    assert_eq!(stats.max_response_time, 1500);
    assert_eq!(stats.total_content_length, 20);
    assert!((stats.avg_response_time() - 1540.0 / 3.0).abs() < 1e-9);
    assert!((stats.fail_ratio() - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_percentiles() {
    let mut stats = RequestStats::new("p");
    for ms in 1..=100 {
        stats.log(&success("p", ms, 0));
    }
    assert_eq!(stats.median_response_time(), 51);
    assert_eq!(stats.percentile(0.95), 96);
    assert_eq!(stats.percentile(0.99), 100);
    assert_eq!(stats.percentile(1.0), 100);
}

#[test]
fn test_empty_stats() {
    let stats = RequestStats::new("idle");
    assert_eq!(stats.avg_response_time(), 0.0);
    assert_eq!(stats.median_response_time(), 0);
    assert_eq!(stats.fail_ratio(), 0.0);
    assert_eq!(stats.min_response_time, None);
}

#[test]
fn test_run_stats_groups_by_label() {
    let mut run = RunStats::new();
    run.log(&success("connect", 0, 0));
    run.log(&success("publish:qos0:a", 5, 10));
    run.log(&timeout("publish:qos0:a", 2000));
    run.log(&timeout("publish:qos0:a", 2100));

    assert_eq!(run.entries.len(), 2);
    assert_eq!(run.get("publish:qos0:a").unwrap().num_failures, 2);

    let failure_key = ("publish:qos0:a".to_string(), "publish timed out".to_string());
    assert_eq!(run.failures.get(&failure_key), Some(&2));

    let total = run.total();
    assert_eq!(total.label, TOTAL_LABEL);
    assert_eq!(total.num_requests, 4);
    assert_eq!(total.num_failures, 2);
    assert_eq!(total.min_response_time, Some(0));
    assert_eq!(total.max_response_time, 2100);
}

#[test]
fn test_render_table() {
    let mut run = RunStats::new();
    run.log(&success("publish:qos0:a", 5, 10));
    run.log(&timeout("publish:qos0:a", 2000));
    run.set_pending_at_shutdown(3);

    let table = run.render_table();
    assert!(table.contains("publish:qos0:a"));
    assert!(table.contains(TOTAL_LABEL));
    assert!(table.contains("Failures:"));
    assert!(table.contains("publish timed out"));
    assert!(table.contains("3 operation(s) still unacknowledged"));
}

#[test]
fn test_json_report() {
    let mut run = RunStats::new();
    run.log(&success("publish:qos0:a", 5, 10));
    run.log(&timeout("publish:qos0:a", 2000));
    run.finish();

    let json: serde_json::Value = serde_json::from_str(&run.to_json().unwrap()).unwrap();
    assert_eq!(json["stats"][0]["label"], "publish:qos0:a");
    assert_eq!(json["stats"][0]["num_requests"], 2);
    assert_eq!(json["total"]["num_failures"], 1);
    assert_eq!(json["failures"][0]["occurrences"], 1);
    assert!(json["finished_at"].is_string());
    assert_eq!(json["pending_at_shutdown"], 0);
}

#[test]
fn test_write_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");

    let mut run = RunStats::new();
    run.log(&success("connect", 0, 0));
    run.write_json(&path).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("\"connect\""));
}

#[tokio::test]
async fn test_collect_drains_until_senders_dropped() {
    let (tx, rx) = mpsc::unbounded_channel();
    let collector = tokio::spawn(collect(rx));

    for i in 0..10 {
        tx.send(success("publish", i, 10)).unwrap();
    }
    drop(tx);

    let stats = collector.await.unwrap();
    assert_eq!(stats.get("publish").unwrap().num_requests, 10);
    assert!(stats.finished_at.is_some());
}
