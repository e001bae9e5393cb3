//! Helpers over the dynamic payload maps that flow between nodes.
//!
//! Node inputs, outputs, and parameters are all `serde_json` objects. The
//! getters here give the hundreds of "read a field with a default" sites a
//! uniform, panic-free shape.

use serde_json::Value;

/// The dynamic payload exchanged between nodes.
pub type JsonMap = serde_json::Map<String, Value>;

/// Read a string field, with a default when absent or not a string.
#[must_use]
pub fn str_or(map: &JsonMap, key: &str, default: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        _ => default.to_string(),
    }
}

/// Read an optional string field.
#[must_use]
pub fn str_opt(map: &JsonMap, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Read an integer field, accepting JSON numbers, with a default.
#[must_use]
pub fn i64_or(map: &JsonMap, key: &str, default: i64) -> i64 {
    match map.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
        _ => default,
    }
}

/// Read an unsigned integer field, with a default.
#[must_use]
pub fn u64_or(map: &JsonMap, key: &str, default: u64) -> u64 {
    match map.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
        _ => default,
    }
}

/// Read a float field, accepting any JSON number, with a default.
#[must_use]
pub fn f64_or(map: &JsonMap, key: &str, default: f64) -> f64 {
    match map.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        _ => default,
    }
}

/// Read a boolean field, with a default.
#[must_use]
pub fn bool_or(map: &JsonMap, key: &str, default: bool) -> bool {
    match map.get(key) {
        Some(Value::Bool(b)) => *b,
        _ => default,
    }
}

/// Read an array field, if present.
#[must_use]
pub fn array<'a>(map: &'a JsonMap, key: &str) -> Option<&'a Vec<Value>> {
    match map.get(key) {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// Read a nested object field, if present.
#[must_use]
pub fn object<'a>(map: &'a JsonMap, key: &str) -> Option<&'a JsonMap> {
    match map.get(key) {
        Some(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Navigate a dotted path (`a.b.c`) through nested objects.
///
/// Returns `None` when any segment is missing or the intermediate value is
/// not an object. An empty path returns the root.
#[must_use]
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Merge `overlay` into `base` at the top level; overlay keys win.
pub fn merge_shallow(base: &mut JsonMap, overlay: &JsonMap) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}

/// Render a value the way interpolation and display sites want it:
/// strings bare, `null` empty, everything else as compact JSON.
#[must_use]
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Loose truthiness over dynamic values: `false`, `null`, `0`, empty
/// strings/arrays/objects are falsy; everything else is truthy.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
