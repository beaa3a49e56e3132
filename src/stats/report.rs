use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::entry::RequestStats;
use crate::outcome::{Outcome, OutcomeEvent};
use crate::utils::LoadError;

/// Label of the aggregated row.
pub const TOTAL_LABEL: &str = "Aggregated";

/// Everything measured during one run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub entries: BTreeMap<String, RequestStats>,
    pub failures: BTreeMap<(String, String), u64>,
    /// Operations still waiting for an acknowledgment when the run stopped.
    pub pending_at_shutdown: usize,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            entries: BTreeMap::new(),
            failures: BTreeMap::new(),
            pending_at_shutdown: 0,
        }
    }

    pub fn log(&mut self, event: &OutcomeEvent) {
        self.entries
            .entry(event.label.clone())
            .or_insert_with(|| RequestStats::new(&event.label))
            .log(event);

        if let Outcome::Failure(kind) = &event.outcome {
            *self
                .failures
                .entry((event.label.clone(), kind.to_string()))
                .or_default() += 1;
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn set_pending_at_shutdown(&mut self, pending: usize) {
        self.pending_at_shutdown = pending;
    }

    pub fn get(&self, label: &str) -> Option<&RequestStats> {
        self.entries.get(label)
    }

    pub fn total(&self) -> RequestStats {
        let mut total = RequestStats::new(TOTAL_LABEL);
        for entry in self.entries.values() {
            total.extend(entry);
        }
        total
    }

    /// Fixed-width summary in the familiar load-test layout.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<40} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10}",
            "Name", "# reqs", "# fails", "Avg", "Min", "Max", "Median", "95%", "99%", "Bytes"
        );
        let _ = writeln!(out, "{}", "-".repeat(124));

        let total = self.total();
        for entry in self.entries.values().chain(std::iter::once(&total)) {
            if entry.label == TOTAL_LABEL {
                let _ = writeln!(out, "{}", "-".repeat(124));
            }
            let _ = writeln!(
                out,
                "{:<40} {:>8} {:>8} {:>8.0} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10}",
                truncate(&entry.label, 40),
                entry.num_requests,
                format!("{}({:.1}%)", entry.num_failures, entry.fail_ratio() * 100.0),
                entry.avg_response_time(),
                entry.min_response_time.unwrap_or(0),
                entry.max_response_time,
                entry.median_response_time(),
                entry.percentile(0.95),
                entry.percentile(0.99),
                entry.total_content_length,
            );
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Failures:");
            for ((label, error), count) in &self.failures {
                let _ = writeln!(out, "{:>8}  {:<40} {}", count, truncate(label, 40), error);
            }
        }

        if self.pending_at_shutdown > 0 {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "{} operation(s) still unacknowledged at shutdown",
                self.pending_at_shutdown
            );
        }
        out
    }

    pub fn to_json(&self) -> Result<String, LoadError> {
        let total = self.total();
        Ok(serde_json::to_string_pretty(&JsonReport::new(self, &total))?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    #[serde(flatten)]
    stats: &'a RequestStats,
    avg_response_time: f64,
    median_response_time: u64,
    p95_response_time: u64,
    p99_response_time: u64,
}

impl<'a> From<&'a RequestStats> for JsonEntry<'a> {
    fn from(stats: &'a RequestStats) -> Self {
        Self {
            stats,
            avg_response_time: stats.avg_response_time(),
            median_response_time: stats.median_response_time(),
            p95_response_time: stats.percentile(0.95),
            p99_response_time: stats.percentile(0.99),
        }
    }
}

#[derive(Serialize)]
struct FailureRow<'a> {
    label: &'a str,
    error: &'a str,
    occurrences: u64,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    pending_at_shutdown: usize,
    stats: Vec<JsonEntry<'a>>,
    total: JsonEntry<'a>,
    failures: Vec<FailureRow<'a>>,
}

impl<'a> JsonReport<'a> {
    fn new(run: &'a RunStats, total: &'a RequestStats) -> Self {
        Self {
            started_at: run.started_at,
            finished_at: run.finished_at,
            pending_at_shutdown: run.pending_at_shutdown,
            stats: run.entries.values().map(JsonEntry::from).collect(),
            total: JsonEntry::from(total),
            failures: run
                .failures
                .iter()
                .map(|((label, error), count)| FailureRow {
                    label,
                    error,
                    occurrences: *count,
                })
                .collect(),
        }
    }
}

fn truncate(s: &str, width: usize) -> &str {
    match s.char_indices().nth(width) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
