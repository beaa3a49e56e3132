use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectSettings;

/// Exponential reconnect delay with equal jitter.
///
/// The n-th consecutive attempt waits between half and all of
/// `min(initial * 2^n, max)`.
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempts: AtomicU32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.initial_backoff_ms),
            Duration::from_millis(settings.max_backoff_ms),
        )
    }

    /// Upper bound of the delay for attempt number `attempt`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn next_delay(&self) -> Duration {
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel);
        let ceiling = u64::try_from(self.ceiling(attempt).as_millis()).unwrap_or(u64::MAX);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        let half = ceiling / 2;
        Duration::from_millis(half + rand::rng().random_range(0..=ceiling - half))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Release);
    }
}
