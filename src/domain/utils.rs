//! Shared helpers for the MCP method implementations

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::McpError;
use crate::security::sanitize_input;

pub const PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

pub fn encode_cursor(offset: usize) -> String {
    BASE64.encode(offset.to_string())
}

/// Offset encoded in `cursor`. Anything absent or malformed decodes to 0.
pub fn decode_cursor(cursor: Option<&str>) -> usize {
    cursor
        .and_then(|cursor| BASE64.decode(cursor).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|text| text.parse::<usize>().ok())
        .unwrap_or(0)
}

pub fn paginate<T>(items: Vec<T>, cursor: Option<&str>) -> Page<T> {
    let total = items.len();
    let offset = decode_cursor(cursor).min(total);
    let end = offset.saturating_add(PAGE_SIZE).min(total);
    let next_cursor = (end < total).then(|| encode_cursor(end));

    Page {
        items: items.into_iter().skip(offset).take(end - offset).collect(),
        next_cursor,
    }
}

/// `{ <key>: [...], "nextCursor"? }` list result for one page.
pub fn page_result<T: Serialize>(key: &str, page: Page<T>) -> Result<Value, McpError> {
    let items = serde_json::to_value(page.items)
        .map_err(|err| McpError::operational(format!("{key} serialization failed: {err}")))?;
    let mut result = Map::new();
    result.insert(key.to_string(), items);
    if let Some(cursor) = page.next_cursor {
        result.insert("nextCursor".to_string(), Value::String(cursor));
    }
    Ok(Value::Object(result))
}

pub fn params_object(params: Option<&Value>) -> Option<&Map<String, Value>> {
    params.and_then(Value::as_object)
}

pub fn optional_str<'a>(params: Option<&'a Value>, field: &str) -> Option<&'a str> {
    params_object(params)
        .and_then(|object| object.get(field))
        .and_then(Value::as_str)
}

pub fn required_str<'a>(params: Option<&'a Value>, field: &str) -> Result<&'a str, McpError> {
    optional_str(params, field)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| McpError::missing_param(field))
}

pub fn cursor_param(params: Option<&Value>) -> Option<&str> {
    optional_str(params, "cursor")
}

/// Sanitized `arguments` object, or an empty object when absent.
pub fn sanitized_arguments(params: Option<&Value>) -> Value {
    params_object(params)
        .and_then(|object| object.get("arguments"))
        .filter(|arguments| !arguments.is_null())
        .map(sanitize_input)
        .unwrap_or_else(|| Value::Object(Map::new()))
}
