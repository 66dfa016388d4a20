//! Query utilities for the FortiOS API
//!
//! Helpers for encoding path keys and query strings.

use serde_json::Value;

/// Build a query string from key/value pairs
pub fn build_query_string(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Append a query string to a path, if there is anything to append
pub fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    if pairs.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, build_query_string(pairs))
    }
}

/// Render an mkey value as a single escaped path segment.
///
/// Keys such as `10.0.0.0/8` or `port1 (wan)` must not split the path.
pub fn encode_mkey(mkey: &Value) -> String {
    let raw = match mkey {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    urlencoding::encode(&raw).into_owned()
}

/// Render a JSON scalar the way filter expressions expect it
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "enable".to_string(),
        Value::Bool(false) => "disable".to_string(),
        other => other.to_string(),
    }
}
