//! Type hints and best-effort coercion of incoming values.

use std::fmt;

use serde_json::{Number, Value};

/// Declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeHint {
    /// No conversion.
    #[default]
    Any,
    Str,
    Int,
    Float,
    Bool,
    /// A list whose elements are coerced with the inner hint.
    List(Box<TypeHint>),
}

impl TypeHint {
    pub fn list(inner: TypeHint) -> Self {
        TypeHint::List(Box::new(inner))
    }

    /// Convert `value` to this hint.
    ///
    /// Null stays null so defaults can still apply. A failed conversion
    /// returns the raw value; the `value` validator reports on it later.
    pub fn coerce(&self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }
        match self {
            TypeHint::Any => value,
            TypeHint::List(inner) => match value {
                Value::Array(items) => {
                    Value::Array(items.into_iter().map(|item| inner.coerce(item)).collect())
                }
                single => Value::Array(vec![inner.coerce(single)]),
            },
            scalar => scalar.convert(&value).unwrap_or(value),
        }
    }

    fn convert(&self, value: &Value) -> Option<Value> {
        match self {
            TypeHint::Str => match value {
                Value::String(_) => Some(value.clone()),
                Value::Number(number) => Some(Value::String(number.to_string())),
                Value::Bool(flag) => Some(Value::String(flag.to_string())),
                Value::Array(_) | Value::Object(_) => Some(Value::String(value.to_string())),
                Value::Null => None,
            },
            TypeHint::Int => to_int(value).map(Value::from),
            TypeHint::Float => to_float(value)
                .and_then(Number::from_f64)
                .map(Value::Number),
            TypeHint::Bool => to_bool(value).map(Value::Bool),
            TypeHint::Any | TypeHint::List(_) => Some(value.clone()),
        }
    }
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        // Floats truncate toward zero.
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .map(f64::trunc)
                .filter(|n| n.abs() < i64::MAX as f64)
                .map(|n| n as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeHint::Any => f.write_str("any"),
            TypeHint::Str => f.write_str("str"),
            TypeHint::Int => f.write_str("int"),
            TypeHint::Float => f.write_str("float"),
            TypeHint::Bool => f.write_str("bool"),
            TypeHint::List(inner) => write!(f, "list[{inner}]"),
        }
    }
}
