use std::collections::BTreeMap;

use serde::Serialize;

use crate::outcome::OutcomeEvent;

/// Aggregated outcomes of one label.
///
/// Response times are kept in a histogram of rounded buckets: exact below
/// 100 ms, then to 2 significant figures below 1 s and to 3 above, so that
/// percentiles stay cheap for long runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestStats {
    pub label: String,
    pub num_requests: u64,
    pub num_failures: u64,
    pub total_response_time: u64,
    pub min_response_time: Option<u64>,
    pub max_response_time: u64,
    pub total_content_length: u64,
    #[serde(skip)]
    response_times: BTreeMap<u64, u64>,
}

impl RequestStats {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn log(&mut self, event: &OutcomeEvent) {
        self.num_requests += 1;
        if !event.is_success() {
            self.num_failures += 1;
        }
        self.log_time(event.elapsed_ms);
        self.total_content_length += event.response_size as u64;
    }

    /// Folds `other` into `self`; used for the aggregated row.
    pub fn extend(&mut self, other: &RequestStats) {
        self.num_requests += other.num_requests;
        self.num_failures += other.num_failures;
        self.total_response_time += other.total_response_time;
        self.total_content_length += other.total_content_length;
        self.max_response_time = self.max_response_time.max(other.max_response_time);
        self.min_response_time = match (self.min_response_time, other.min_response_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        for (bucket, count) in &other.response_times {
            *self.response_times.entry(*bucket).or_default() += count;
        }
    }

    fn log_time(&mut self, elapsed_ms: u64) {
        self.total_response_time += elapsed_ms;
        self.max_response_time = self.max_response_time.max(elapsed_ms);
        self.min_response_time = Some(match self.min_response_time {
            Some(min) => min.min(elapsed_ms),
            None => elapsed_ms,
        });
        *self.response_times.entry(round_bucket(elapsed_ms)).or_default() += 1;
    }

    pub fn avg_response_time(&self) -> f64 {
        if self.num_requests == 0 {
            return 0.0;
        }
        self.total_response_time as f64 / self.num_requests as f64
    }

    pub fn median_response_time(&self) -> u64 {
        self.percentile(0.5)
    }

    /// Smallest bucket at or below which at least `fraction` of the requests
    /// fall. 0 when nothing was logged.
    pub fn percentile(&self, fraction: f64) -> u64 {
        if self.num_requests == 0 {
            return 0;
        }
        let wanted = (self.num_requests as f64 * fraction) as u64;
        let mut processed = 0;
        for (bucket, count) in self.response_times.iter().rev() {
            processed += count;
            if self.num_requests - processed <= wanted {
                return *bucket;
            }
        }
        0
    }

    pub fn fail_ratio(&self) -> f64 {
        if self.num_requests == 0 {
            return 0.0;
        }
        self.num_failures as f64 / self.num_requests as f64
    }
}

pub(crate) fn round_bucket(elapsed_ms: u64) -> u64 {
    let step = match elapsed_ms {
        0..100 => return elapsed_ms,
        100..1_000 => 10,
        1_000..10_000 => 100,
        _ => 1_000,
    };
    (elapsed_ms + step / 2) / step * step
}
