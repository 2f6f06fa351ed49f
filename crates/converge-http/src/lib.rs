// # JSON-over-HTTP Remote API
//
// This crate provides a RemoteApi implementation for control planes that
// expose their methods as JSON POST endpoints.
//
// ## Wire Format
//
// - Request: `POST {endpoint}/{method}` with the params as a JSON object body
// - Success: any 2xx status; the JSON body is the raw response
// - Failure: non-2xx status; the error code is read from the body's `code`
//   or `__type` field, or derived from the status when the body has neither
//
// ## Responsibilities
//
// One `invoke` is one HTTP request. Retries, backoff, pagination and caching
// all belong to the engine's RequestExecutor.
//
// ## Security
//
// - The API token never appears in logs or Debug output
// - Request bodies are never logged here (the executor decides)

use async_trait::async_trait;
use converge_core::config::ApiConfig;
use converge_core::traits::{ApiError, PaginationSpec, Params, RemoteApi, RemoteApiFactory};
use converge_core::{ApiRegistry, Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Error code for failures that never reached the remote side
pub const TRANSPORT_ERROR_CODE: &str = "RequestError";

/// JSON-over-HTTP remote API
pub struct HttpApi {
    /// Base URL without trailing slash
    endpoint: String,

    /// Bearer token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Pagination rules per method
    pagination: HashMap<String, PaginationSpec>,

    /// HTTP client with the configured timeout
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApi")
            .field("endpoint", &self.endpoint)
            .field("api_token", &"<REDACTED>")
            .field("paginated_methods", &self.pagination.len())
            .finish()
    }
}

impl HttpApi {
    /// Create a new HTTP API client
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Base URL; methods are appended as path segments
    /// - `api_token`: Bearer token sent with every request
    /// - `timeout`: Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the token is empty or the HTTP
    /// client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("HTTP API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_token,
            pagination: HashMap::new(),
            client,
        })
    }

    /// Declare pagination rules for `method`
    pub fn with_pagination(mut self, method: impl Into<String>, rules: PaginationSpec) -> Self {
        self.pagination.insert(method.into(), rules);
        self
    }

    /// URL for one method call
    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.endpoint, method.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn invoke(&self, method: &str, params: &Params) -> std::result::Result<Value, ApiError> {
        let url = self.url(method);
        tracing::trace!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(params)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(&e))?;

        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Object(Params::new()));
        }

        serde_json::from_str(&body).map_err(|e| {
            ApiError::new("InvalidResponse", format!("response is not JSON: {}", e))
                .with_status(status.as_u16())
        })
    }

    fn pagination(&self, method: &str) -> Option<PaginationSpec> {
        self.pagination.get(method).cloned()
    }

    fn api_name(&self) -> &str {
        "http"
    }
}

fn transport_error(err: &reqwest::Error) -> ApiError {
    let message = if err.is_timeout() {
        format!("request timed out: {}", err)
    } else {
        format!("HTTP request failed: {}", err)
    };
    ApiError::new(TRANSPORT_ERROR_CODE, message)
}

/// Build the error signal for a non-2xx response
///
/// The body's `code` (or `__type`) and `message` win when present, so remote
/// error codes reach the executor's signature matching verbatim.
pub fn error_from_response(status: u16, body: &str) -> ApiError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let code = field("code")
        .or_else(|| field("__type"))
        .unwrap_or_else(|| code_for_status(status).to_string());
    let message = field("message")
        .or_else(|| field("Message"))
        .unwrap_or_else(|| body.trim().to_string());

    ApiError::new(code, message).with_status(status)
}

/// Default error code for an HTTP status
fn code_for_status(status: u16) -> &'static str {
    match status {
        400 => "ValidationError",
        401 | 403 => "AccessDenied",
        404 => "NotFound",
        409 => "Conflict",
        429 => "Throttling",
        500..=599 => "ServiceUnavailable",
        _ => "HttpError",
    }
}

/// Factory for creating HTTP APIs from configuration
pub struct HttpApiFactory;

impl RemoteApiFactory for HttpApiFactory {
    fn create(&self, config: &ApiConfig) -> Result<Arc<dyn RemoteApi>> {
        match config {
            ApiConfig::Http {
                endpoint,
                api_token,
                timeout_secs,
                pagination,
            } => {
                let api = pagination.iter().fold(
                    HttpApi::new(endpoint.clone(), api_token.clone(), Duration::from_secs(*timeout_secs))?,
                    |api, (method, rules)| api.with_pagination(method.clone(), rules.clone()),
                );
                Ok(Arc::new(api))
            }
            _ => Err(Error::config("Invalid config for HTTP API")),
        }
    }
}

/// Register the HTTP API with a registry under the "http" type name
///
/// # Example
///
/// ```rust
/// use converge_core::ApiRegistry;
///
/// let registry = ApiRegistry::new();
/// converge_http::register(&registry);
/// assert!(registry.has("http"));
/// ```
pub fn register(registry: &ApiRegistry) {
    registry.register("http", Box::new(HttpApiFactory));
}
