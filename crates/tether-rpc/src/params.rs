//! Positional parameter access for handlers.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::MethodError;
use crate::registry::Handle;

/// Ordered parameter list of one request.
///
/// Handlers pull typed values out by position. Every accessor reports failures
/// as `invalid-params` errors naming the offending position, so a handler can
/// simply propagate them with `?`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<Value>);

impl Params {
    /// Wraps a list of values.
    #[must_use]
    pub const fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Number of parameters supplied.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no parameters were supplied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw value at `index`.
    #[must_use]
    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// All values in order.
    #[must_use]
    pub const fn as_slice(&self) -> &[Value] {
        self.0.as_slice()
    }

    /// Deserialises the required parameter at `index`.
    ///
    /// # Errors
    ///
    /// Fails when the parameter is absent or does not deserialise into `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, MethodError> {
        let value = self
            .raw(index)
            .ok_or_else(|| MethodError::invalid_params(format!("parameter {index} is missing")))?;
        decode(index, value)
    }

    /// Deserialises an optional parameter; absent and `null` both yield `None`.
    ///
    /// # Errors
    ///
    /// Fails when the parameter is present but does not deserialise into `T`.
    pub fn optional<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, MethodError> {
        match self.raw(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => decode(index, value).map(Some),
        }
    }

    /// Reads a resource handle at `index`.
    ///
    /// # Errors
    ///
    /// Fails when the parameter is absent or is not a non-negative integer.
    pub fn handle(&self, index: usize) -> Result<Handle, MethodError> {
        self.get(index)
    }

    /// Fails unless at least `count` parameters were supplied.
    ///
    /// # Errors
    ///
    /// Returns an `invalid-params` error describing the shortfall.
    pub fn require(&self, count: usize) -> Result<(), MethodError> {
        if self.len() < count {
            return Err(MethodError::invalid_params(format!(
                "expected at least {count} parameters, got {}",
                self.len()
            )));
        }
        Ok(())
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

fn decode<T: DeserializeOwned>(index: usize, value: &Value) -> Result<T, MethodError> {
    T::deserialize(value)
        .map_err(|error| MethodError::invalid_params(format!("parameter {index}: {error}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::ErrorCode;

    fn params(values: Value) -> Params {
        match values {
            Value::Array(values) => Params::new(values),
            other => Params::new(vec![other]),
        }
    }

    #[test]
    fn extracts_typed_values() {
        let params = params(json!([7, "x", true, [0, 0, 10, 10]]));
        assert_eq!(params.get::<i64>(0).expect("int"), 7);
        assert_eq!(params.get::<String>(1).expect("string"), "x");
        assert!(params.get::<bool>(2).expect("bool"));
        assert_eq!(params.get::<[i32; 4]>(3).expect("rect"), [0, 0, 10, 10]);
    }

    #[test]
    fn missing_parameter_names_its_position() {
        let error = params(json!([])).get::<i64>(0).expect_err("missing");
        assert_eq!(error.code(), ErrorCode::InvalidParams);
        assert!(error.message().contains("parameter 0"));
    }

    #[test]
    fn wrong_type_is_invalid_params() {
        let error = params(json!(["seven"])).get::<i64>(0).expect_err("wrong type");
        assert_eq!(error.code(), ErrorCode::InvalidParams);
    }

    #[test]
    fn optional_treats_null_as_absent() {
        let params = params(json!([null]));
        assert_eq!(params.optional::<String>(0).expect("null"), None);
        assert_eq!(params.optional::<String>(3).expect("absent"), None);
    }

    #[test]
    fn negative_handles_are_rejected() {
        let error = params(json!([-1])).handle(0).expect_err("negative");
        assert_eq!(error.code(), ErrorCode::InvalidParams);
    }

    #[test]
    fn require_reports_shortfall() {
        let error = params(json!([1])).require(2).expect_err("too few");
        assert!(error.message().contains("at least 2"));
    }
}
