//! Retry policy for connector calls
//!
//! Exponential backoff with a cap, plus the consecutive-failure circuit
//! breaker used by the relay loop. Connector errors are classified so the
//! loop can tell a flaky ledger from a permanently bad transfer.

use std::time::Duration;

use crate::connectors::ConnectorError;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate backoff duration for a given attempt (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Circuit breaker configuration for the relay loop.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed ticks before pausing the loop
    pub threshold: u32,
    /// How long to pause when the breaker trips
    pub pause_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            pause_duration: Duration::from_secs(300),
        }
    }
}

/// Classifies errors for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Temporary failure, retry with backoff
    Transient,
    /// Already processed, skip without retrying
    Duplicate,
    /// Permanent failure, do not retry
    Permanent,
    /// Unknown, may retry with backoff
    Unknown,
}

/// Classify a connector error for retry decisions.
pub fn classify_connector_error(error: &ConnectorError) -> ErrorClass {
    match error {
        ConnectorError::Timeout(_) | ConnectorError::Transport(_) => ErrorClass::Transient,
        ConnectorError::NotFound(_) => ErrorClass::Unknown,
        ConnectorError::Rejected(message) => {
            let lower = message.to_lowercase();
            if lower.contains("already been processed") || lower.contains("already known") {
                ErrorClass::Duplicate
            } else {
                ErrorClass::Permanent
            }
        }
        ConnectorError::InvalidResponse(_) => ErrorClass::Permanent,
    }
}
