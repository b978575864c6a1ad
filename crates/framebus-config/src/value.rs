//! Comparison and rendering rules for attribute values.

use serde_json::Value;

/// Truthiness: null, `false`, zero, and empty strings or containers are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// No usable value: null, or an empty string, list or map.
///
/// Zero and `false` are values.
pub fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Attribute-level equality. Numbers compare by value, so `10 == 10.0`.
pub fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => a == b,
            },
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loosely_equal(x, y))
        }
        _ => left == right,
    }
}

/// Membership of `needle` in an array container or among an object's keys.
///
/// Returns `None` when `container` is not a container. Strings are not.
pub fn contains(container: &Value, needle: &Value) -> Option<bool> {
    match container {
        Value::Array(items) => Some(items.iter().any(|item| loosely_equal(item, needle))),
        Value::Object(map) => Some(needle.as_str().is_some_and(|key| map.contains_key(key))),
        _ => None,
    }
}

/// Text used in error messages: strings bare, everything else as JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!(-0.5), json!("no"), json!([0]), json!({"a": 1})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn empty_values_count_as_unset() {
        for unset in [json!(null), json!(""), json!([]), json!({})] {
            assert!(is_unset(&unset), "{unset} should be unset");
        }
        for set in [json!(0), json!(false), json!(" "), json!([null])] {
            assert!(!is_unset(&set), "{set} should be set");
        }
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(loosely_equal(&json!(10), &json!(10.0)));
        assert!(!loosely_equal(&json!(10), &json!("10")));
        assert!(loosely_equal(&json!([1, 2]), &json!([1.0, 2])));
    }

    #[test]
    fn membership() {
        assert_eq!(contains(&json!(["echo", "reject"]), &json!("echo")), Some(true));
        assert_eq!(contains(&json!([1, 2]), &json!(2.0)), Some(true));
        assert_eq!(contains(&json!({"echo": 1}), &json!("echo")), Some(true));
        assert_eq!(contains(&json!({"echo": 1}), &json!(1)), Some(false));
        assert_eq!(contains(&json!("echo"), &json!("e")), None);
    }

    #[test]
    fn rendering() {
        assert_eq!(render(&json!(42)), "42");
        assert_eq!(render(&json!("tcp://127.0.0.1:5555")), "tcp://127.0.0.1:5555");
        assert_eq!(render(&json!(["a", "b"])), r#"["a","b"]"#);
        assert_eq!(render(&json!(null)), "null");
    }
}
