//! Runtime values shared by computed fields, rows, and templates.
//!
//! Values follow Python conventions because the job files are written by
//! people who think in those terms: `True`/`None` spelling, `7 / 2 == 3.5`,
//! floor division and modulo that round toward negative infinity.

use std::cmp::Ordering;
use std::fmt;

use crate::error::ExprError;

/// Longest string (in bytes) or list that repetition or `range()` may build.
pub(crate) const MAX_SEQUENCE_LEN: usize = 1_000_000;

/// A dynamically typed scalar or list.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&item.repr())?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Repetition count for `seq * n`; negative counts give an empty sequence.
fn repeat_count(len: usize, n: i64) -> Result<usize, ExprError> {
    let times = usize::try_from(n).unwrap_or(0);
    match len.checked_mul(times) {
        Some(total) if total <= MAX_SEQUENCE_LEN => Ok(times),
        _ => Err(ExprError::Value(format!(
            "repeating a sequence of length {len} {n} times is too large"
        ))),
    }
}

/// Truncate a float to an integer the way `int()` does.
pub(crate) fn float_to_int(x: f64) -> Result<i64, ExprError> {
    let truncated = x.trunc();
    if x.is_nan() {
        return Err(ExprError::Value("cannot convert float nan to integer".into()));
    }
    // i64::MAX is not representable as f64; 2^63 is the first value out of range.
    if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated >= 9_223_372_036_854_775_808.0 {
        return Err(ExprError::Value(format!(
            "cannot convert float {} to integer",
            format_float(x)
        )));
    }
    Ok(truncated as i64)
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".into()
    } else if x.is_infinite() {
        if x > 0.0 { "inf".into() } else { "-inf".into() }
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl Value {
    /// Type name as reported in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
        }
    }

    /// Quoted form used inside list displays.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_string(),
        }
    }

    /// Python truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Numeric view: bools count as integers.
    fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(*b as i64)),
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }

    /// Float view of a numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(|n| n.to_f64())
    }

    /// Integer view of an integral value (bools included, floats excluded).
    pub fn as_i64(&self) -> Option<i64> {
        match self.as_number()? {
            Number::Int(n) => Some(n),
            Number::Float(_) => None,
        }
    }

    // ── JSON interop ────────────────────────────────────────────────

    /// Convert a JSON value from a data source into a runtime value.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            // Nested objects have no counterpart; keep their JSON text.
            serde_json::Value::Object(_) => Value::Str(json.to_string()),
        }
    }

    /// Convert into JSON for write-back payloads.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    // ── Comparison ──────────────────────────────────────────────────

    /// Python `==`: numbers compare across int/float/bool, everything else
    /// compares structurally within its own type.
    pub fn py_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.cmp_value(b) == Some(Ordering::Equal);
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
            }
            _ => false,
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`.
    pub fn py_cmp(&self, other: &Value) -> Result<Ordering, ExprError> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a
                .cmp_value(b)
                .ok_or_else(|| ExprError::Value("comparison with nan".into()));
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    if !x.py_eq(y) {
                        return x.py_cmp(y);
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(ExprError::Type(format!(
                "'<' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// Python `in`.
    pub fn contains(&self, needle: &Value) -> Result<bool, ExprError> {
        match (self, needle) {
            (Value::Str(hay), Value::Str(n)) => Ok(hay.contains(n.as_str())),
            (Value::Str(_), other) => Err(ExprError::Type(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
            (Value::List(items), n) => Ok(items.iter().any(|item| item.py_eq(n))),
            (other, _) => Err(ExprError::Type(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    // ── Arithmetic ──────────────────────────────────────────────────

    pub fn add(&self, rhs: &Value) -> Result<Value, ExprError> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b).cloned().collect()))
            }
            _ => self.numeric(rhs, "+", i64::checked_add, |a, b| a + b),
        }
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, ExprError> {
        self.numeric(rhs, "-", i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, ExprError> {
        match (self, rhs) {
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                let times = repeat_count(s.len(), *n)?;
                Ok(Value::Str(s.repeat(times)))
            }
            (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
                let times = repeat_count(items.len(), *n)?;
                let mut out = Vec::with_capacity(items.len() * times);
                for _ in 0..times {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::List(out))
            }
            _ => self.numeric(rhs, "*", i64::checked_mul, |a, b| a * b),
        }
    }

    /// True division always yields a float.
    pub fn div(&self, rhs: &Value) -> Result<Value, ExprError> {
        let (a, b) = self.numeric_pair(rhs, "/")?;
        let divisor = b.to_f64();
        if divisor == 0.0 {
            return Err(ExprError::ZeroDivision);
        }
        Ok(Value::Float(a.to_f64() / divisor))
    }

    pub fn floor_div(&self, rhs: &Value) -> Result<Value, ExprError> {
        match self.numeric_pair(rhs, "//")? {
            (Number::Int(_), Number::Int(0)) => Err(ExprError::ZeroDivision),
            (Number::Int(a), Number::Int(b)) => {
                let q = a
                    .checked_div(b)
                    .ok_or_else(|| ExprError::Value("integer overflow".into()))?;
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    Ok(Value::Int(q - 1))
                } else {
                    Ok(Value::Int(q))
                }
            }
            (a, b) => {
                let divisor = b.to_f64();
                if divisor == 0.0 {
                    return Err(ExprError::ZeroDivision);
                }
                Ok(Value::Float((a.to_f64() / divisor).floor()))
            }
        }
    }

    pub fn rem(&self, rhs: &Value) -> Result<Value, ExprError> {
        match self.numeric_pair(rhs, "%")? {
            (Number::Int(_), Number::Int(0)) => Err(ExprError::ZeroDivision),
            (Number::Int(a), Number::Int(b)) => {
                let r = a.wrapping_rem(b);
                if r != 0 && ((r < 0) != (b < 0)) {
                    Ok(Value::Int(r + b))
                } else {
                    Ok(Value::Int(r))
                }
            }
            (a, b) => {
                let (a, b) = (a.to_f64(), b.to_f64());
                if b == 0.0 {
                    return Err(ExprError::ZeroDivision);
                }
                Ok(Value::Float(a - b * (a / b).floor()))
            }
        }
    }

    pub fn pow(&self, rhs: &Value) -> Result<Value, ExprError> {
        match self.numeric_pair(rhs, "**")? {
            (Number::Int(a), Number::Int(b)) if b >= 0 => {
                let exp = u32::try_from(b)
                    .map_err(|_| ExprError::Value("exponent too large".into()))?;
                a.checked_pow(exp)
                    .map(Value::Int)
                    .ok_or_else(|| ExprError::Value("integer overflow".into()))
            }
            (a, b) => Ok(Value::Float(a.to_f64().powf(b.to_f64()))),
        }
    }

    pub fn neg(&self) -> Result<Value, ExprError> {
        match self.as_number() {
            Some(Number::Int(n)) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ExprError::Value("integer overflow".into())),
            Some(Number::Float(x)) => Ok(Value::Float(-x)),
            None => Err(ExprError::Type(format!(
                "bad operand type for unary -: '{}'",
                self.type_name()
            ))),
        }
    }

    fn numeric_pair(&self, rhs: &Value, op: &str) -> Result<(Number, Number), ExprError> {
        match (self.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(ExprError::Type(format!(
                "unsupported operand type(s) for {op}: '{}' and '{}'",
                self.type_name(),
                rhs.type_name()
            ))),
        }
    }

    fn numeric(
        &self,
        rhs: &Value,
        op: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value, ExprError> {
        match self.numeric_pair(rhs, op)? {
            (Number::Int(a), Number::Int(b)) => int_op(a, b)
                .map(Value::Int)
                .ok_or_else(|| ExprError::Value("integer overflow".into())),
            (a, b) => Ok(Value::Float(float_op(a.to_f64(), b.to_f64()))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn to_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    fn cmp_value(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_follows_python_str() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::from("a")]).to_string(),
            "[1, 'a']"
        );
    }

    #[test]
    fn floor_division_and_modulo_round_down() {
        assert_eq!(Value::Int(-7).floor_div(&Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(Value::Int(-7).rem(&Value::Int(2)).unwrap(), Value::Int(1));
        assert_eq!(Value::Int(7).rem(&Value::Int(-2)).unwrap(), Value::Int(-1));
        assert_eq!(Value::Int(7).div(&Value::Int(2)).unwrap(), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(Value::Int(1).div(&Value::Int(0)), Err(ExprError::ZeroDivision));
        assert_eq!(Value::Int(1).rem(&Value::Int(0)), Err(ExprError::ZeroDivision));
    }

    #[test]
    fn mixed_numeric_equality() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::from("1").py_eq(&Value::Int(1)));
    }

    #[test]
    fn string_plus_int_is_a_type_error() {
        let err = Value::from("a").add(&Value::Int(1)).unwrap_err();
        assert!(matches!(err, ExprError::Type(_)));
    }

    #[test]
    fn json_round_trip_keeps_integers_integral() {
        let json = serde_json::json!({"a": 1});
        assert_eq!(Value::from_json(&json["a"]), Value::Int(1));
        assert_eq!(Value::Float(1.5).to_json(), serde_json::json!(1.5));
    }
}
