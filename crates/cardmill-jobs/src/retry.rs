//! Retry policy: which failures get redelivered, and after how long.

use std::collections::HashSet;
use std::time::Duration;

use cardmill_core::{defaults, ErrorKind};

/// Attempt limit, backoff base, and the set of retryable failure kinds.
///
/// Option and validation failures are terminal no matter how many attempts
/// remain; transient upstream and substrate failures are redelivered with
/// exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    retryable: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::BACKOFF_BASE_MS),
            retryable: [
                ErrorKind::Upstream,
                ErrorKind::Timeout,
                ErrorKind::MergeOutput,
                ErrorKind::Store,
                ErrorKind::Io,
                ErrorKind::Internal,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryPolicy {
    /// Set the attempt limit.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the backoff base.
    pub fn with_base_delay(mut self, base: Duration) -> Self {
        self.base_delay = base;
        self
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Whether a failure on the given 1-based attempt should be redelivered.
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        attempt < self.max_attempts && self.is_retryable(kind)
    }

    /// Delay before redelivering after a failure on the given 1-based
    /// attempt: base * 2^(attempt - 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay * 2u32.pow(exponent)
    }
}
