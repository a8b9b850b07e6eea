//! Helpers for working with model values at render time

use super::error::ExecutionCause;
use serde_json::{Map, Value};

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Evaluated {
    Value(Value),
    /// Already-rendered text, written without encoding
    Markup(String),
}

impl Evaluated {
    pub fn into_value(self) -> Value {
        match self {
            Evaluated::Value(value) => value,
            Evaluated::Markup(text) => Value::String(text),
        }
    }
}

/// Short name of a value's kind for error messages
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Looks up `name` on `target`.
///
/// Objects resolve their own keys first. `Count` and `Length` are available
/// on arrays, strings and objects that have no key of that name.
pub(crate) fn member(target: &Value, name: &str) -> Option<Value> {
    match (target, name) {
        (Value::Object(map), _) if map.contains_key(name) => map.get(name).cloned(),
        (Value::Object(map), "Count") => Some(Value::from(map.len())),
        (Value::Array(items), "Count" | "Length") => Some(Value::from(items.len())),
        (Value::String(s), "Length") => Some(Value::from(s.chars().count())),
        _ => None,
    }
}

/// Text written for a value, before encoding
pub(crate) fn stringify(value: &Value) -> Result<String, ExecutionCause> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(_) | Value::Object(_) => Err(ExecutionCause::NotPrintable {
            kind: kind(value).to_string(),
        }),
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Equality that treats `1` and `1.0` as the same number
pub(crate) fn loosely_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

/// Items a `foreach` walks. Objects yield `{ Key, Value }` pairs in key order.
pub(crate) fn iterate(value: Value) -> Result<Vec<Value>, ExecutionCause> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| {
                let mut pair = Map::new();
                pair.insert("Key".to_string(), Value::String(key));
                pair.insert("Value".to_string(), value);
                Value::Object(pair)
            })
            .collect()),
        other => Err(ExecutionCause::NotIterable {
            kind: kind(&other).to_string(),
        }),
    }
}

pub fn html_encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => encoded.push_str("&amp;"),
            '<' => encoded.push_str("&lt;"),
            '>' => encoded.push_str("&gt;"),
            '"' => encoded.push_str("&quot;"),
            '\'' => encoded.push_str("&#39;"),
            c => encoded.push(c),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_member_lookup() {
        let model = json!({"Name": "World", "Tags": ["a", "b"], "Count": 7});
        assert_eq!(member(&model, "Name"), Some(json!("World")));
        assert_eq!(member(&model, "Missing"), None);
        assert_eq!(member(&model["Tags"], "Count"), Some(json!(2)));
        assert_eq!(member(&model["Name"], "Length"), Some(json!(5)));
        // A real key wins over the pseudo-member
        assert_eq!(member(&model, "Count"), Some(json!(7)));
        assert_eq!(member(&json!(null), "Name"), None);
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!(null)).unwrap(), "");
        assert_eq!(stringify(&json!(42)).unwrap(), "42");
        assert_eq!(stringify(&json!(true)).unwrap(), "true");
        assert!(matches!(
            stringify(&json!([1])),
            Err(ExecutionCause::NotPrintable { kind }) if kind == "array"
        ));
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!("x")));
        assert!(truthy(&json!({"a": 1})));
    }

    #[test]
    fn test_loose_number_equality() {
        assert!(loosely_equal(&json!(1), &json!(1.0)));
        assert!(!loosely_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_iterate_object_pairs() {
        let items = iterate(json!({"b": 2, "a": 1})).unwrap();
        assert_eq!(items[0], json!({"Key": "a", "Value": 1}));
        assert!(iterate(json!("text")).is_err());
    }

    #[test]
    fn test_html_encode() {
        assert_eq!(
            html_encode(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }
}
