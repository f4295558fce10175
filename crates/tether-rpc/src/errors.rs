//! Error types for request parsing and handler failures.
//!
//! [`DispatchError`] covers everything that goes wrong before a handler runs.
//! [`MethodError`] is what handlers return; it carries the [`ErrorCode`] that
//! ends up on the wire.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::{ErrorCode, RequestId};

/// Errors surfaced while reading and parsing a request line.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as JSON.
    #[error("malformed request: {message}")]
    Malformed {
        /// Parser diagnostic.
        message: String,
        /// Underlying JSON error, when there is one.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// JSON did not form a valid request envelope.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        /// Identifier salvaged from the envelope, if any.
        id: Option<RequestId>,
        /// What was wrong with the envelope.
        message: String,
    },

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Bytes read before giving up.
        size: usize,
        /// Configured ceiling.
        max_size: usize,
    },
}

impl DispatchError {
    /// Creates a malformed error from a serde error.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed error with a custom message.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    #[must_use]
    pub fn invalid_structure(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            id,
            message: message.into(),
        }
    }

    /// Creates a request too large error.
    #[must_use]
    pub const fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Wire code reported to the controller.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed { .. } => ErrorCode::ParseError,
            Self::InvalidStructure { .. } | Self::RequestTooLarge { .. } => {
                ErrorCode::InvalidRequest
            }
        }
    }

    /// Identifier to answer with; `None` is sent as a null id.
    #[must_use]
    pub const fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::InvalidStructure { id, .. } => id.as_ref(),
            Self::Malformed { .. } | Self::RequestTooLarge { .. } => None,
        }
    }

    /// Converts the error into the descriptor sent on the wire.
    #[must_use]
    pub fn to_method_error(&self) -> MethodError {
        MethodError::new(self.code(), self.to_string())
    }
}

/// Failure produced by a handler, or by the dispatcher on a handler's behalf.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct MethodError {
    code: ErrorCode,
    message: String,
    data: Option<Value>,
}

impl MethodError {
    /// Creates an error with an explicit code.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured detail to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// No handler is registered under `method`.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("method '{method}' is not registered"),
        )
    }

    /// The handler rejected its parameters.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// The request named a handle with no live resource.
    #[must_use]
    pub fn resource_not_found(handle: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("no resource registered for handle {handle}"),
        )
    }

    /// The operation behind the handler failed.
    #[must_use]
    pub fn handler_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::HandlerFailed, message)
    }

    /// The server broke one of its own invariants.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The server no longer accepts work.
    #[must_use]
    pub fn shutting_down() -> Self {
        Self::new(ErrorCode::ShuttingDown, "server is shutting down")
    }

    /// Failure category.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable explanation.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Optional structured detail.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub(crate) fn into_parts(self) -> (ErrorCode, String, Option<Value>) {
        (self.code, self.message, self.data)
    }
}
