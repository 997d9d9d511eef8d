// File: src/value.rs
// Purpose: Nested value tree built from flattened form data

use crate::upload::FileUpload;
use indexmap::IndexMap;
use intent_forms_path::{Path, Segment};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

/// Object map that keeps submission order
pub type Map = IndexMap<String, Value>;

/// Supported value types in a nested form tree
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    File(FileUpload),
    Array(Vec<Value>),
    Object(Map),
}

impl Value {
    /// Empty object
    pub fn object() -> Self {
        Value::Object(Map::new())
    }

    /// Reads the value at `path`
    ///
    /// Keys read object entries, an index reads element `n` of an array (or
    /// key `"n"` of an object), the append marker reads the first element.
    /// Any shape mismatch, and the empty path, yields `None`.
    pub fn pick(&self, path: &Path) -> Option<&Value> {
        if path.is_empty() {
            return None;
        }

        path.segments()
            .iter()
            .try_fold(self, |current, segment| match (current, segment) {
                (Value::Object(map), Segment::Key(key)) => map.get(key),
                (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
                (Value::Array(items), Segment::Index(index)) => items.get(*index),
                (Value::Array(items), Segment::Append) => items.first(),
                _ => None,
            })
    }

    /// Name of the value's type, as used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::File(_) => "file",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Arrays and objects
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Object entry by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    /// Scalar rendered for an HTML `value` attribute, `None` for containers and files
    pub fn to_attr_value(&self) -> Option<String> {
        match self {
            Value::Bool(_) | Value::Number(_) | Value::String(_) => Some(self.to_string()),
            _ => None,
        }
    }

    /// Plain JSON, files reduced to their metadata
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => format_number(*n),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::File(file) => serde_json::json!({
                "name": file.name,
                "type": file.content_type,
                "size": file.size(),
            }),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Integers stay integers in JSON
fn format_number(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                // Format number nicely (remove .0 for integers)
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => f.write_str(s),
            Value::File(file) => f.write_str(&file.name),
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Object(_) => f.write_str("[Object]"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => format_number(*n).serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::File(file) => file.serialize(serializer),
            Value::Array(items) => items.serialize(serializer),
            Value::Object(map) => map.serialize(serializer),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<FileUpload> for Value {
    fn from(file: FileUpload) -> Self {
        Value::File(file)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(map)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Value::Object(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Free-function form of [`Value::pick`]
pub fn pick_from<'a>(path: &Path, value: &'a Value) -> Option<&'a Value> {
    value.pick(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree() -> Value {
        Value::from(json!({
            "name": "Ada",
            "tags": ["math", "engines"],
            "addresses": [{"city": "London"}],
            "meta": {"0": "zero"}
        }))
    }

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn test_pick_key() {
        assert_eq!(tree().pick(&path("name")), Some(&Value::from("Ada")));
    }

    #[test]
    fn test_pick_index_and_append() {
        let tree = tree();
        assert_eq!(tree.pick(&path("tags[1]")), Some(&Value::from("engines")));
        assert_eq!(tree.pick(&path("tags[]")), Some(&Value::from("math")));
        assert_eq!(tree.pick(&path("addresses[0].city")), Some(&Value::from("London")));
        assert_eq!(tree.pick(&path("addresses[].city")), Some(&Value::from("London")));
    }

    #[test]
    fn test_pick_index_against_object() {
        assert_eq!(tree().pick(&path("meta[0]")), Some(&Value::from("zero")));
    }

    #[test]
    fn test_pick_mismatches_are_none() {
        let tree = tree();
        assert_eq!(tree.pick(&Path::root()), None);
        assert_eq!(tree.pick(&path("missing")), None);
        assert_eq!(tree.pick(&path("tags[9]")), None);
        assert_eq!(tree.pick(&path("name.first")), None);
        assert_eq!(tree.pick(&path("name[0]")), None);
        assert_eq!(tree.pick(&path("meta[]")), None);
        assert_eq!(Value::Null.pick(&path("a")), None);
    }

    #[test]
    fn test_display_numbers() {
        assert_eq!(Value::from(3.0).to_string(), "3");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn test_json_keeps_order_and_integers() {
        let value: Value = vec![("b", Value::from(1)), ("a", Value::from(1.5))].into_iter().collect();
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"b":1,"a":1.5}"#);
        assert_eq!(value.to_json(), json!({"b": 1, "a": 1.5}));
    }
}
