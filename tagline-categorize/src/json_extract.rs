//! Tolerant extraction of a JSON payload from free-form model output.
//!
//! Models wrap JSON in markdown fences or surround it with prose. We strip
//! a leading fence, slice from the first opening bracket to the last matching
//! closing bracket, and parse that slice. Anything else is a parse failure.

use serde_json::{Map, Value};

use crate::error::LlmError;

/// Drop a surrounding ```/```json fence if the text starts with one.
pub fn strip_code_fences(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // Skip the info string ("json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn outermost<'a>(text: &'a str, open: char, close: char) -> Option<&'a str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Slice from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    outermost(strip_code_fences(text), '{', '}')
}

/// Slice from the first `[` to the last `]`.
pub fn extract_json_array(text: &str) -> Option<&str> {
    outermost(strip_code_fences(text), '[', ']')
}

pub fn parse_object(text: &str) -> Result<Map<String, Value>, LlmError> {
    let slice = extract_json_object(text)
        .ok_or_else(|| LlmError::MalformedJson("no JSON object found".to_string()))?;
    match serde_json::from_str::<Value>(slice) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(LlmError::MalformedJson(format!("expected object, got {other}"))),
        Err(e) => Err(LlmError::MalformedJson(e.to_string())),
    }
}

pub fn parse_array(text: &str) -> Result<Vec<Value>, LlmError> {
    let slice = extract_json_array(text)
        .ok_or_else(|| LlmError::MalformedJson("no JSON array found".to_string()))?;
    match serde_json::from_str::<Value>(slice) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(LlmError::MalformedJson("expected array".to_string())),
        Err(e) => Err(LlmError::MalformedJson(e.to_string())),
    }
}
