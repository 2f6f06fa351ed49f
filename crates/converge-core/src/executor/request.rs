//! Logical operation requests

use crate::traits::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the useful data sits in a raw response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum PayloadKey {
    /// A top-level field of the response object
    Field(String),
    /// The whole response, passed through as-is
    WholeResponse,
}

/// One logical operation, possibly spanning several physical calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Remote method name
    pub method: String,

    /// Response payload location
    pub payload: PayloadKey,

    /// Request parameters (the cursor is added per page)
    #[serde(default)]
    pub params: Params,

    /// Yield a singular payload as a one-element sequence
    #[serde(default = "default_wrap_singular")]
    pub wrap_singular: bool,

    /// The next-page cursor lives inside the payload mapping
    #[serde(default)]
    pub cursor_in_payload: bool,

    /// Never retry: every failure is permanent
    #[serde(default)]
    pub instant_raise: bool,
}

impl OperationRequest {
    /// Create a request normalizing on a payload field
    pub fn new(method: impl Into<String>, payload_field: impl Into<String>) -> Self {
        Self::with_payload(method, PayloadKey::Field(payload_field.into()))
    }

    /// Create a request normalizing on the whole response
    pub fn whole_response(method: impl Into<String>) -> Self {
        Self::with_payload(method, PayloadKey::WholeResponse)
    }

    fn with_payload(method: impl Into<String>, payload: PayloadKey) -> Self {
        Self {
            method: method.into(),
            payload,
            params: Params::new(),
            wrap_singular: default_wrap_singular(),
            cursor_in_payload: false,
            instant_raise: false,
        }
    }

    /// Add one request parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replace all request parameters
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Reject singular payloads instead of wrapping them
    pub fn sequence_only(mut self) -> Self {
        self.wrap_singular = false;
        self
    }

    /// Read the next-page cursor from inside the payload
    pub fn cursor_in_payload(mut self) -> Self {
        self.cursor_in_payload = true;
        self
    }

    /// Raise on the first failure, without retrying
    pub fn instant_raise(mut self) -> Self {
        self.instant_raise = true;
        self
    }

    /// JSON rendering of the parameters, attached to errors
    pub(crate) fn params_json(&self) -> String {
        Value::Object(self.params.clone()).to_string()
    }
}

fn default_wrap_singular() -> bool {
    true
}
