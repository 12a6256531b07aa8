//! Retry policy for record writes.

use std::time::Duration;

use crate::config::StoreConfig;

/// How many times a record write is attempted and how long to wait between
/// attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delays_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for RetryPolicy {
    fn from(config: &StoreConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            delays_ms: config.retry_delays_ms.clone(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests and tooling.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            delays_ms: vec![],
        }
    }

    /// Delay before retry number `retry` (0-based).
    ///
    /// Follows the configured schedule and keeps repeating its last entry.
    pub fn backoff_duration(&self, retry: u32) -> Duration {
        let delay = self
            .delays_ms
            .get(retry as usize)
            .or_else(|| self.delays_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(delay)
    }
}
