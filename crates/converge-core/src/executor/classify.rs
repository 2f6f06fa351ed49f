//! Failure classification over the remote error signal

use crate::config::ExecutorConfig;
use crate::traits::ApiError;

/// How the executor treats one failed physical call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rate limited: cheap to retry, linear backoff
    Throttled,
    /// Unknown failure: expensive to retry, fixed delay
    Retryable,
    /// Never retried
    Permanent,
}

/// Substring matcher over `code: message`
///
/// Permanent signatures are checked first, so an error matching both lists
/// is never retried.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    throttling: Vec<String>,
    permanent: Vec<String>,
}

impl ErrorClassifier {
    /// Create a classifier from explicit signature lists
    pub fn new(throttling: Vec<String>, permanent: Vec<String>) -> Self {
        Self {
            throttling,
            permanent,
        }
    }

    /// Create a classifier from executor configuration
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(
            config.throttling_signatures.clone(),
            config.permanent_signatures.clone(),
        )
    }

    /// Classify one remote error
    pub fn classify(&self, error: &ApiError) -> FailureClass {
        let signal = error.signal();

        if self.permanent.iter().any(|s| signal.contains(s.as_str())) {
            FailureClass::Permanent
        } else if self.throttling.iter().any(|s| signal.contains(s.as_str())) {
            FailureClass::Throttled
        } else {
            FailureClass::Retryable
        }
    }
}
