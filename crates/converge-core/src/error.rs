//! Error types for the convergence engine
//!
//! Every failure that leaves the engine is one of the variants below. Only
//! throttling and other retryable remote failures are handled internally (by
//! the executor's retry budget); everything else propagates unchanged.

use crate::traits::ApiError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the convergence engine
#[derive(Error, Debug)]
pub enum Error {
    /// Remote call failed with a non-retryable error
    #[error("Permanent failure in {operation} (params: {params}): {source}")]
    Permanent {
        /// Remote method name
        operation: String,
        /// JSON rendering of the parameters attempted
        params: String,
        /// Last raw error observed
        source: ApiError,
    },

    /// The response payload did not match a supported shape
    #[error("Unsupported response shape from {operation}: {detail}")]
    UnsupportedShape {
        /// Remote method name
        operation: String,
        /// What was wrong with the payload
        detail: String,
    },

    /// More than one remote resource matched the identity predicate
    #[error("Ambiguous state for {kind}: {} resources matched ({})", identities.len(), identities.join(", "))]
    AmbiguousState {
        /// Resource kind name
        kind: String,
        /// Identities of every match
        identities: Vec<String>,
    },

    /// The poller observed an error status, or one outside the permitted set
    #[error("Resource {identity} entered status {status} (expected one of: {})", expected.join(", "))]
    RemoteErrorStatus {
        /// Resource identity
        identity: String,
        /// Status observed
        status: String,
        /// Desired statuses the poll was waiting for
        expected: Vec<String>,
    },

    /// Retry budget exhausted before the operation succeeded
    #[error("Retry budget exhausted for {operation} ({spent}/{ceiling} units, params: {params}): {last_error}")]
    RetryBudgetExhausted {
        /// Remote method name
        operation: String,
        /// JSON rendering of the parameters attempted
        params: String,
        /// Units charged so far
        spent: u32,
        /// Configured ceiling
        ceiling: u32,
        /// Last raw error observed
        last_error: ApiError,
    },

    /// Status poll did not reach a desired status in time
    #[error("Timed out after {timeout:?} waiting for {identity} to reach {} (last status: {})", desired.join(", "), last_status.as_deref().unwrap_or("<none>"))]
    PollTimeout {
        /// Resource identity
        identity: String,
        /// Desired statuses
        desired: Vec<String>,
        /// Last status seen, if the resource was ever observed
        last_status: Option<String>,
        /// Configured timeout
        timeout: Duration,
    },

    /// The caller cancelled the operation at a suspension point
    #[error("Operation {operation} cancelled")]
    Cancelled {
        /// Remote method or engine operation name
        operation: String,
    },

    /// A single-value call returned nothing
    #[error("No values returned by {0}")]
    NoValues(String),

    /// A single-value call returned more than one item
    #[error("{operation} returned {count} values where exactly one was expected")]
    TooManyValues {
        /// Remote method name
        operation: String,
        /// Number of items returned
        count: usize,
    },

    /// A re-observation reported a different identity for the same resource
    #[error("Identity of resource changed from {current} to {observed}")]
    IdentityChanged {
        /// Identity already assigned
        current: String,
        /// Identity in the new observation
        observed: String,
    },

    /// Resource model violates its invariants
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource cache errors
    #[error("Resource cache error: {0}")]
    Cache(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a resource cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create an invalid resource error
    pub fn invalid_resource(msg: impl Into<String>) -> Self {
        Self::InvalidResource(msg.into())
    }

    /// Create an unsupported shape error
    pub fn unsupported_shape(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnsupportedShape {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    /// Report that a resource kind cannot compute a configuration
    ///
    /// Kinds use this instead of guessing a value (for example a threshold
    /// for a metric they do not understand). The result is permanent: no
    /// retry will change the answer.
    ///
    /// # Parameters
    ///
    /// - `kind`: Resource kind or sub-kind that lacks a policy
    /// - `detail`: What was requested
    pub fn unsupported_configuration(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        let kind = kind.into();
        let detail = detail.into();
        Self::Permanent {
            operation: format!("configure {}", kind),
            params: "{}".to_string(),
            source: ApiError::new(
                "UnsupportedConfiguration",
                format!("configuration not supported for {}: {}", kind, detail),
            ),
        }
    }

    /// Whether this error is one of the two timeout outcomes
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::RetryBudgetExhausted { .. } | Self::PollTimeout { .. }
        )
    }

    /// Whether this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The last raw remote error carried by this error, if any
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Permanent { source, .. } => Some(source),
            Self::RetryBudgetExhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
