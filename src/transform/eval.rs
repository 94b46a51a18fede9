//! Expression evaluation over JSON values
//!
//! Numbers compare numerically regardless of integer/float representation.
//! Integer arithmetic stays integral until it would overflow; division always
//! produces a float. Results that JSON cannot represent (NaN, infinities) are
//! errors rather than silently becoming `null`.

use serde_json::{Number, Value};
use std::cmp::Ordering;

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::ExprError;

/// Evaluate an expression, resolving `$('name')` through `lookup`
pub fn evaluate(expr: &Expr, lookup: &dyn Fn(&str) -> Option<Value>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Field(name) => lookup(name.as_str()).ok_or_else(|| ExprError::UndefinedField(name.clone())),
        Expr::Unary(op, operand) => {
            let value = evaluate(operand, lookup)?;
            eval_unary(*op, value)
        }
        Expr::Binary(BinaryOp::And, left, right) => {
            if !expect_bool(BinaryOp::And, evaluate(left, lookup)?)? {
                return Ok(Value::Bool(false));
            }
            expect_bool(BinaryOp::And, evaluate(right, lookup)?).map(Value::Bool)
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            if expect_bool(BinaryOp::Or, evaluate(left, lookup)?)? {
                return Ok(Value::Bool(true));
            }
            expect_bool(BinaryOp::Or, evaluate(right, lookup)?).map(Value::Bool)
        }
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, lookup)?;
            let right = evaluate(right, lookup)?;
            eval_binary(*op, &left, &right)
        }
    }
}

/// JSON type name used in error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_mismatch(op: BinaryOp, left: &Value, right: &Value) -> ExprError {
    ExprError::TypeMismatch {
        op: op.symbol().to_string(),
        left: type_name(left).to_string(),
        right: type_name(right).to_string(),
    }
}

fn expect_bool(op: BinaryOp, value: Value) -> Result<bool, ExprError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::UnaryTypeMismatch {
            op: op.symbol().to_string(),
            operand: type_name(&other).to_string(),
        }),
    }
}

fn float_value(f: f64) -> Result<Value, ExprError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ExprError::Arithmetic(format!("result {} is not a finite number", f)))
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, ExprError> {
    match (op, &value) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Number(n)) => match n.as_i64().and_then(i64::checked_neg) {
            Some(i) => Ok(Value::from(i)),
            None => float_value(-n.as_f64().unwrap_or(f64::NAN)),
        },
        _ => Err(ExprError::UnaryTypeMismatch {
            op: op.to_string(),
            operand: type_name(&value).to_string(),
        }),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Ordering, ExprError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| type_mismatch(op, left, right))
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt => Ok(Value::Bool(compare(op, left, right)? == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(op, left, right)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(compare(op, left, right)? == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(op, left, right)? != Ordering::Less)),
        BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
            _ => Err(type_mismatch(op, left, right)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => match (left, right) {
            (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
            _ => Err(type_mismatch(op, left, right)),
        },
        // Short-circuit operators are handled in `evaluate`
        BinaryOp::And | BinaryOp::Or => Err(type_mismatch(op, left, right)),
    }
}

fn arithmetic(op: BinaryOp, a: &Number, b: &Number) -> Result<Value, ExprError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let integral = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Rem if y == 0 => {
                return Err(ExprError::Arithmetic("remainder by zero".to_string()))
            }
            BinaryOp::Rem => x.checked_rem(y),
            _ => None,
        };
        if let Some(result) = integral {
            return Ok(Value::from(result));
        }
    }

    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(ExprError::Arithmetic("operand is not representable".to_string())),
    };
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div if y == 0.0 => {
            return Err(ExprError::Arithmetic("division by zero".to_string()))
        }
        BinaryOp::Div => x / y,
        BinaryOp::Rem if y == 0.0 => {
            return Err(ExprError::Arithmetic("remainder by zero".to_string()))
        }
        BinaryOp::Rem => x % y,
        _ => {
            return Err(ExprError::Arithmetic(format!(
                "'{}' is not an arithmetic operator",
                op
            )))
        }
    };
    float_value(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::parser::parse_expression;
    use serde_json::json;
    use std::collections::HashMap;

    fn eval_with(expression: &str, fields: &[(&str, Value)]) -> Result<Value, ExprError> {
        let fields: HashMap<String, Value> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let expr = parse_expression(expression)?;
        evaluate(&expr, &|name: &str| fields.get(name).cloned())
    }

    fn eval(expression: &str) -> Result<Value, ExprError> {
        eval_with(expression, &[])
    }

    #[test]
    fn test_field_equality() {
        let row = [("x", json!(3)), ("y", json!(3.0))];
        assert_eq!(eval_with("$('x')==$('y')", &row).unwrap(), json!(true));
        let row = [("x", json!(3)), ("y", json!(5))];
        assert_eq!(eval_with("$('x')==$('y')", &row).unwrap(), json!(false));
    }

    #[test]
    fn test_equality_across_types_is_false() {
        assert_eq!(eval("1 == '1'").unwrap(), json!(false));
        assert_eq!(eval("null == false").unwrap(), json!(false));
        assert_eq!(eval("null != 0").unwrap(), json!(true));
        assert_eq!(eval("'a' == 'a'").unwrap(), json!(true));
    }

    #[test]
    fn test_integer_arithmetic_stays_integral() {
        assert_eq!(eval("7 + 3 * 2").unwrap(), json!(13));
        assert_eq!(eval("7 % 3").unwrap(), json!(1));
        assert_eq!(eval("-(2 - 5)").unwrap(), json!(3));
        assert_eq!(eval("7 / 2").unwrap(), json!(3.5));
        assert_eq!(eval("1.5 + 1").unwrap(), json!(2.5));
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() {
        let result = eval("9223372036854775807 + 1").unwrap();
        assert!(result.is_f64());
    }

    #[test]
    fn test_string_concatenation_and_ordering() {
        assert_eq!(eval("'ab' + 'cd'").unwrap(), json!("abcd"));
        assert_eq!(eval("'apple' < 'banana'").unwrap(), json!(true));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("2 < 3").unwrap(), json!(true));
        assert_eq!(eval("3 <= 3.0").unwrap(), json!(true));
        assert_eq!(eval("2 > 3").unwrap(), json!(false));
        assert_eq!(eval("3 >= 4").unwrap(), json!(false));
    }

    #[test]
    fn test_short_circuit_skips_undefined_field() {
        assert_eq!(eval("false and $('missing')").unwrap(), json!(false));
        assert_eq!(eval("true or $('missing')").unwrap(), json!(true));
        assert_eq!(
            eval("true and $('missing')").unwrap_err(),
            ExprError::UndefinedField("missing".to_string())
        );
    }

    #[test]
    fn test_type_errors() {
        assert!(matches!(eval("1 < 'a'"), Err(ExprError::TypeMismatch { .. })));
        assert!(matches!(eval("'a' - 'b'"), Err(ExprError::TypeMismatch { .. })));
        assert!(matches!(eval("null + 1"), Err(ExprError::TypeMismatch { .. })));
        assert!(matches!(eval("not 1"), Err(ExprError::UnaryTypeMismatch { .. })));
        assert!(matches!(eval("-'a'"), Err(ExprError::UnaryTypeMismatch { .. })));
        assert!(matches!(eval("1 and true"), Err(ExprError::UnaryTypeMismatch { .. })));
    }

    #[test]
    fn test_arithmetic_errors() {
        assert!(matches!(eval("1 / 0"), Err(ExprError::Arithmetic(_))));
        assert!(matches!(eval("1 % 0"), Err(ExprError::Arithmetic(_))));
        assert!(matches!(eval("1.5 % 0"), Err(ExprError::Arithmetic(_))));
        assert!(matches!(eval("1e308 * 10"), Err(ExprError::Arithmetic(_))));
    }

    #[test]
    fn test_structured_field_values() {
        let row = [("loc", json!({"lat": 1.0})), ("other", json!({"lat": 1.0}))];
        assert_eq!(eval_with("$('loc') == $('other')", &row).unwrap(), json!(true));
        assert_eq!(eval_with("$('loc')", &row).unwrap(), json!({"lat": 1.0}));
    }
}
