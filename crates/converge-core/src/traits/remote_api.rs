// # Remote API Trait
//
// Defines the single boundary between the engine and a remote control-plane
// API: one physical call, plus per-method pagination rules.
//
// ## Implementations
//
// - JSON over HTTP: `converge-http` crate
// - Test doubles: scripted responses in contract tests
//
// ## Usage
//
// ```rust,ignore
// use converge_core::RemoteApi;
//
// let response = api.invoke("list_queues", &params).await?;
// if let Some(rules) = api.pagination("list_queues") {
//     // rules.request_key / rules.response_key carry the cursor
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Request parameters for one physical call
pub type Params = Map<String, Value>;

/// Raw error reported by a remote API
///
/// The `code` and `message` together form the error signal the executor
/// classifies (see [`ApiError::signal`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "Throttling", "AccessDenied")
    pub code: String,
    /// Human-readable message from the remote side
    pub message: String,
    /// Transport status, when the API has one
    pub status: Option<u16>,
}

impl ApiError {
    /// Create an error without a transport status
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Attach a transport status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Text matched against throttling and permanent signatures
    pub fn signal(&self) -> String {
        format!("{}: {}", self.code, self.message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.code, status, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Cursor rules for one paginated method family
///
/// A request cursor equal to `initial` is omitted from the request. A
/// response cursor that is missing, `null` or equal to `terminal` ends the
/// sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationSpec {
    /// Outbound request field carrying the cursor
    pub request_key: String,
    /// Inbound response field carrying the next cursor
    pub response_key: String,
    /// "No cursor yet" sentinel
    #[serde(default)]
    pub initial: Value,
    /// "No more pages" sentinel
    #[serde(default)]
    pub terminal: Value,
}

impl PaginationSpec {
    /// Create rules where request and response use different field names
    pub fn new(request_key: impl Into<String>, response_key: impl Into<String>) -> Self {
        Self {
            request_key: request_key.into(),
            response_key: response_key.into(),
            initial: Value::Null,
            terminal: Value::Null,
        }
    }

    /// Create rules where request and response share one field name
    pub fn symmetric(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(key.clone(), key)
    }

    /// Set the "no cursor yet" sentinel
    pub fn with_initial(mut self, initial: Value) -> Self {
        self.initial = initial;
        self
    }

    /// Set the "no more pages" sentinel
    pub fn with_terminal(mut self, terminal: Value) -> Self {
        self.terminal = terminal;
        self
    }

    /// Whether `cursor` ends the page sequence
    pub fn is_terminal(&self, cursor: &Value) -> bool {
        cursor.is_null() || *cursor == self.terminal
    }

    /// Whether `cursor` should be left out of the outbound request
    pub fn is_initial(&self, cursor: &Value) -> bool {
        *cursor == self.initial
    }
}

/// Trait for remote control-plane APIs
///
/// # Responsibilities
///
/// Implementations perform exactly one physical call per `invoke`. They must
/// not retry, sleep, paginate or cache: the executor owns all of that. A
/// failure is returned as an [`ApiError`] whose code and message let the
/// executor tell throttling from permanent failures.
///
/// # Thread Safety
///
/// Implementations must be usable concurrently from several engine calls.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Issue one physical call
    ///
    /// # Parameters
    ///
    /// - `method`: Remote method name
    /// - `params`: Request parameters, cursor included when paginating
    ///
    /// # Returns
    ///
    /// - `Ok(Value)`: The raw response
    /// - `Err(ApiError)`: The remote error signal
    async fn invoke(&self, method: &str, params: &Params) -> Result<Value, ApiError>;

    /// Pagination rules for `method`, or `None` if it returns a single page
    fn pagination(&self, method: &str) -> Option<PaginationSpec>;

    /// API name (for logging/debugging)
    fn api_name(&self) -> &str;
}

/// Helper trait for constructing remote APIs from configuration
pub trait RemoteApiFactory: Send + Sync {
    /// Create a RemoteApi instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration for this API type
    ///
    /// # Returns
    ///
    /// A shareable RemoteApi trait object
    fn create(
        &self,
        config: &crate::config::ApiConfig,
    ) -> Result<std::sync::Arc<dyn RemoteApi>, crate::Error>;
}
