//! Weighted retry budget
//!
//! One budget lives for the whole of an `execute` call, pages included.
//! Throttled attempts are cheap and back off linearly; other retryable
//! failures are expensive and sleep a fixed baseline.

use super::classify::FailureClass;
use crate::config::ExecutorConfig;
use std::time::Duration;

/// Retry budget for one logical operation
#[derive(Debug, Clone)]
pub struct RetryBudget {
    spent: u32,
    ceiling: u32,
    throttle_weight: u32,
    failure_weight: u32,
    backoff_unit: Duration,
    retry_delay: Duration,
    failures: u32,
}

impl RetryBudget {
    /// Create a fresh budget from executor configuration
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            spent: 0,
            ceiling: config.retry_ceiling,
            throttle_weight: config.throttle_weight,
            failure_weight: config.failure_weight,
            backoff_unit: config.backoff_unit(),
            retry_delay: config.retry_delay(),
            failures: 0,
        }
    }

    /// Charge one failed attempt
    ///
    /// # Returns
    ///
    /// - `Some(delay)`: sleep this long, then retry
    /// - `None`: the ceiling has been reached; stop
    ///
    /// Permanent failures are never charged and return `None`.
    pub fn charge(&mut self, class: FailureClass) -> Option<Duration> {
        let delay = match class {
            FailureClass::Permanent => return None,
            FailureClass::Throttled => {
                self.spent = self.spent.saturating_add(self.throttle_weight);
                self.backoff_unit.saturating_mul(self.failures.saturating_add(1))
            }
            FailureClass::Retryable => {
                self.spent = self.spent.saturating_add(self.failure_weight);
                self.retry_delay
            }
        };
        self.failures = self.failures.saturating_add(1);

        if self.spent >= self.ceiling {
            None
        } else {
            Some(delay)
        }
    }

    /// Units charged so far
    pub fn spent(&self) -> u32 {
        self.spent
    }

    /// Ceiling at which the operation times out
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Failed attempts charged so far
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
