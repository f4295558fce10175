//! Wire envelopes exchanged with the controller.
//!
//! Requests and responses follow the JSON-RPC 2.0 shape, one JSON document per
//! line. Error codes are kebab-case strings rather than the numeric JSON-RPC
//! codes so that controllers can match on them without a lookup table.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::errors::{DispatchError, MethodError};
use crate::params::Params;

/// Protocol version marker carried by every response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Version {
    /// JSON-RPC 2.0.
    #[default]
    #[serde(rename = "2.0")]
    V2,
}

/// Identifier correlating a response with the request that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier, the form most controllers use.
    Number(Number),
    /// String identifier.
    String(String),
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(formatter, "{number}"),
            Self::String(text) => write!(formatter, "{text:?}"),
        }
    }
}

/// Machine-readable failure category reported to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// The request line was not valid JSON.
    ParseError,
    /// The JSON did not form a valid request envelope.
    InvalidRequest,
    /// No handler is registered under the requested name.
    MethodNotFound,
    /// The handler rejected its parameters.
    InvalidParams,
    /// The request named a handle with no live resource.
    ResourceNotFound,
    /// The handler or the operation it started failed.
    HandlerFailed,
    /// The server broke one of its own invariants.
    InternalError,
    /// The server is shutting down and no longer accepts work.
    ShuttingDown,
}

impl ErrorCode {
    /// Returns the wire spelling of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "parse-error",
            Self::InvalidRequest => "invalid-request",
            Self::MethodNotFound => "method-not-found",
            Self::InvalidParams => "invalid-params",
            Self::ResourceNotFound => "resource-not-found",
            Self::HandlerFailed => "handler-failed",
            Self::InternalError => "internal-error",
            Self::ShuttingDown => "shutting-down",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Failure descriptor embedded in an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Failure category.
    pub code: ErrorCode,
    /// Human-readable explanation.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<MethodError> for ErrorObject {
    fn from(error: MethodError) -> Self {
        let (code, message, data) = error.into_parts();
        Self {
            code,
            message,
            data,
        }
    }
}

/// Either half of a response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Successful result value.
    Result(Value),
    /// Failure descriptor.
    Error(ErrorObject),
}

/// One answer to an identified request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version marker.
    #[serde(default)]
    pub jsonrpc: Version,
    /// Identifier of the request being answered; null when it was unreadable.
    pub id: Option<RequestId>,
    /// Result or error.
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: Version::V2,
            id,
            outcome: Outcome::Result(result),
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Option<RequestId>, error: MethodError) -> Self {
        Self {
            jsonrpc: Version::V2,
            id,
            outcome: Outcome::Error(error.into()),
        }
    }

    /// Builds a response from a handler result.
    #[must_use]
    pub fn from_result(id: Option<RequestId>, result: Result<Value, MethodError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::failure(id, error),
        }
    }

    /// Returns the success value, if any.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    /// Returns the error descriptor, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorObject> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(error) => Some(error),
        }
    }
}

/// One parsed inbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation identifier; `None` marks a notification.
    pub id: Option<RequestId>,
    /// Method name, trimmed.
    pub method: String,
    /// Positional parameters.
    pub params: Params,
}

/// Loosely typed envelope used to salvage the id from bad requests.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<Value>,
    #[serde(default)]
    params: Option<Value>,
}

impl Request {
    /// Builds a request directly, mainly for embedding and tests.
    #[must_use]
    pub fn new(id: Option<RequestId>, method: impl Into<String>, params: Params) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Parses one request line.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed before
    /// parsing. An explicit `"id": null` is treated as a notification.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Malformed`] if the line is empty or not JSON,
    /// and [`DispatchError::InvalidStructure`] if the JSON is not a usable
    /// request envelope. The latter carries the request id whenever one could
    /// be read.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }

        let value: Value = serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)?;
        if !value.is_object() {
            return Err(DispatchError::invalid_structure(
                None,
                "request must be a JSON object",
            ));
        }
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|error| DispatchError::invalid_structure(None, error.to_string()))?;

        let id = match envelope.id {
            None => None,
            Some(Value::Number(number)) => Some(RequestId::Number(number)),
            Some(Value::String(text)) => Some(RequestId::String(text)),
            Some(_) => {
                return Err(DispatchError::invalid_structure(
                    None,
                    "id must be a number or a string",
                ));
            }
        };

        let method = match envelope.method {
            Some(Value::String(method)) if !method.trim().is_empty() => method.trim().to_owned(),
            Some(Value::String(_)) => {
                return Err(DispatchError::invalid_structure(id, "method field is empty"));
            }
            Some(_) => {
                return Err(DispatchError::invalid_structure(id, "method must be a string"));
            }
            None => {
                return Err(DispatchError::invalid_structure(id, "method field is missing"));
            }
        };

        let params = match envelope.params {
            None => Params::default(),
            Some(Value::Array(values)) => Params::new(values),
            Some(object @ Value::Object(_)) => Params::new(vec![object]),
            Some(_) => {
                return Err(DispatchError::invalid_structure(
                    id,
                    "params must be an array or an object",
                ));
            }
        };

        Ok(Self { id, method, params })
    }

    /// Returns true when the request expects no response.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or_default()
}
