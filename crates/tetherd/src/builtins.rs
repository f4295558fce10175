//! Methods that need no host state and answer on the receiving thread.

use serde_json::{Number, Value};

use tether_rpc::{MethodError, MethodTable, Params};

/// Registers the stateless methods on `table`.
pub fn register_builtins(table: &mut MethodTable) {
    table.register("add", add);
}

/// Sums two numbers, staying integral when both operands are integers.
fn add(params: Params) -> Result<Value, MethodError> {
    let lhs: Number = params.get(0)?;
    let rhs: Number = params.get(1)?;

    if let (Some(lhs), Some(rhs)) = (lhs.as_i64(), rhs.as_i64())
        && let Some(sum) = lhs.checked_add(rhs)
    {
        return Ok(Value::from(sum));
    }

    let (Some(lhs), Some(rhs)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(MethodError::invalid_params("operands must be numbers"));
    };
    Number::from_f64(lhs + rhs)
        .map(Value::Number)
        .ok_or_else(|| MethodError::handler_failed("sum is not a finite number"))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;
    use tether_rpc::ErrorCode;

    use super::*;

    fn call(args: Value) -> Result<Value, MethodError> {
        let Value::Array(values) = args else {
            panic!("params must be an array");
        };
        add(Params::new(values))
    }

    #[rstest]
    #[case::integers(json!([2, 3]), json!(5))]
    #[case::negative(json!([-2, 3]), json!(1))]
    #[case::fractional(json!([1.5, 2.25]), json!(3.75))]
    #[case::mixed(json!([1, 0.5]), json!(1.5))]
    #[case::overflow_widens(json!([i64::MAX, 1]), json!(9_223_372_036_854_775_808.0))]
    fn sums_operands(#[case] args: Value, #[case] expected: Value) {
        assert_eq!(call(args).expect("sum"), expected);
    }

    #[rstest]
    #[case::missing(json!([2]))]
    #[case::text(json!(["2", 3]))]
    #[case::null(json!([null, 3]))]
    fn rejects_non_numeric_operands(#[case] args: Value) {
        let error = call(args).expect_err("invalid operands");
        assert_eq!(error.code(), ErrorCode::InvalidParams);
    }

    #[test]
    fn infinite_sums_fail() {
        let error = call(json!([f64::MAX, f64::MAX])).expect_err("overflow");
        assert_eq!(error.code(), ErrorCode::HandlerFailed);
    }
}
