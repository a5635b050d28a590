//! Per-name retry backoff

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Exponential backoff tracked separately for every name
///
/// The n-th consecutive failure of a name waits `base * 2^(n-1)`, capped at
/// `max`. A success resets the name.
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure of `name` and returns how long to wait before retrying
    pub fn next_delay(&self, name: &str) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let attempts = failures.entry(name.to_string()).or_insert(0);
        *attempts = attempts.saturating_add(1);

        let exponent = (*attempts - 1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }

    pub fn reset(&self, name: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}
