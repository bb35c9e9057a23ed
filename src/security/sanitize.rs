use serde_json::{Map, Value};

/// Keys that are dropped from every object level of untrusted input.
pub const FORBIDDEN_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Rebuilds `value` without any [`FORBIDDEN_KEYS`] at any depth. The input is
/// only borrowed; the returned value is a fresh copy.
pub fn sanitize_input(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !FORBIDDEN_KEYS.contains(&key.as_str()))
                .map(|(key, item)| (key.clone(), sanitize_input(item)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_input).collect()),
        _ => value.clone(),
    }
}
