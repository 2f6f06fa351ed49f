//! Response payload normalization
//!
//! A raw response is decided once into a closed [`Payload`] shape and then
//! matched exhaustively. Anything that does not fit fails with
//! [`Error::UnsupportedShape`] rather than being coerced.

use super::request::{OperationRequest, PayloadKey};
use crate::error::{Error, Result};
use crate::traits::PaginationSpec;
use serde_json::{Map, Value};

/// Shape of a response payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Each element is yielded
    Sequence(Vec<Value>),
    /// Yielded once
    Mapping(Map<String, Value>),
    /// Yielded once
    Scalar(Value),
    /// `null`, yielded once
    Absent,
}

impl Payload {
    /// Decide the shape of a payload value
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Array(items) => Payload::Sequence(items),
            Value::Object(map) => Payload::Mapping(map),
            Value::Null => Payload::Absent,
            scalar => Payload::Scalar(scalar),
        }
    }

    /// Whether this payload is a sequence
    pub fn is_sequence(&self) -> bool {
        matches!(self, Payload::Sequence(_))
    }

    /// Normalize into the items to yield
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Payload::Sequence(items) => items,
            Payload::Mapping(map) => vec![Value::Object(map)],
            Payload::Scalar(value) => vec![value],
            Payload::Absent => vec![Value::Null],
        }
    }
}

/// Items and continuation cursor extracted from one page
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Page {
    pub(crate) items: Vec<Value>,
    /// `Value::Null` when the response carries no cursor
    pub(crate) next_cursor: Value,
}

/// Split one raw response into page items and the next cursor
pub(crate) fn extract_page(
    op: &OperationRequest,
    response: Value,
    rules: Option<&PaginationSpec>,
) -> Result<Page> {
    let top_cursor = match (rules, op.cursor_in_payload) {
        (Some(rules), false) => response
            .get(rules.response_key.as_str())
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    };

    let payload = match &op.payload {
        PayloadKey::WholeResponse => Payload::classify(response),
        PayloadKey::Field(key) => {
            let mut map = match response {
                Value::Object(map) => map,
                other => {
                    return Err(Error::unsupported_shape(
                        &op.method,
                        format!("expected an object holding '{}', got {}", key, kind_of(&other)),
                    ));
                }
            };
            let value = map.remove(key).ok_or_else(|| {
                Error::unsupported_shape(&op.method, format!("response has no '{}' field", key))
            })?;
            Payload::classify(value)
        }
    };

    let next_cursor = match (rules, op.cursor_in_payload) {
        (Some(rules), true) => match &payload {
            Payload::Mapping(map) => map
                .get(rules.response_key.as_str())
                .cloned()
                .unwrap_or(Value::Null),
            _ => {
                return Err(Error::unsupported_shape(
                    &op.method,
                    "cursor is configured inside the payload but the payload is not an object",
                ));
            }
        },
        _ => top_cursor,
    };

    if next_cursor.is_array() || next_cursor.is_object() {
        return Err(Error::unsupported_shape(
            &op.method,
            format!("cursor '{}' is not a scalar", next_cursor),
        ));
    }

    if !op.wrap_singular && !payload.is_sequence() {
        return Err(Error::unsupported_shape(
            &op.method,
            "expected a sequence payload and wrapping of singular values is disabled",
        ));
    }

    Ok(Page {
        items: payload.into_items(),
        next_cursor,
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
