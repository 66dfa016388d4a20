//! Payload normalization
//!
//! Turns caller arguments into the JSON body the appliance expects:
//!
//! - `snake_case` argument names become hyphenated wire names
//! - booleans become `"enable"` / `"disable"`
//! - `null` is dropped unless the field is nullable
//! - numbers sent to string-typed fields become strings
//! - primitives passed to table fields are wrapped as `[{<entry key>: value}]`
//!
//! Normalizing an already normalized payload returns it unchanged.

use crate::error::ApiError;
use fortios_schema::{FieldMetadata, FieldType, MetadataStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the body is assembled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Keep the caller's argument order and every container as given
    Raw,
    /// Sort keys and drop empty objects; empty lists are kept
    #[default]
    Normalized,
}

/// Wire name for a caller-supplied argument name
pub fn wire_name(name: &str, metadata: Option<&MetadataStore>) -> String {
    metadata
        .and_then(|m| m.resolve_name(name))
        .map_or_else(|| name.replace('_', "-"), str::to_string)
}

/// Normalize caller arguments into a wire body
///
/// # Arguments
/// * `args` - Caller arguments, keyed by argument name
/// * `metadata` - Field table of the endpoint, if known
/// * `mode` - Raw or normalized assembly
pub fn normalize(
    args: &Map<String, Value>,
    metadata: Option<&MetadataStore>,
    mode: BuildMode,
) -> Result<Map<String, Value>, ApiError> {
    let mut entries: Vec<(String, Value)> = Vec::with_capacity(args.len());

    for (name, value) in args {
        let key = wire_name(name, metadata);
        let field = metadata.and_then(|m| m.field(&key));

        let Some(value) = normalize_value(&key, value, field, mode)? else {
            continue;
        };

        if entries.iter().any(|(existing, _)| *existing == key) {
            return Err(ApiError::PayloadShape {
                field: key,
                reason: "supplied more than once".to_string(),
            });
        }
        entries.push((key, value));
    }

    if mode == BuildMode::Normalized {
        entries.retain(|(_, value)| !is_empty_object(value));
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    }

    Ok(entries.into_iter().collect())
}

/// Normalize one value; `None` means the field is omitted
fn normalize_value(
    key: &str,
    value: &Value,
    field: Option<&FieldMetadata>,
    mode: BuildMode,
) -> Result<Option<Value>, ApiError> {
    if value.is_null() {
        return Ok(field.filter(|f| f.nullable).map(|_| Value::Null));
    }

    if let Some(field) = field.filter(|f| f.field_type == FieldType::Table) {
        return wrap_table(key, value, field, mode).map(Some);
    }

    let normalized = match value {
        Value::Bool(flag) => Value::String(toggle(*flag).to_string()),
        Value::Number(n) if field.is_some_and(|f| f.field_type.is_string_like()) => {
            Value::String(n.to_string())
        }
        Value::Object(map) if mode == BuildMode::Normalized => Value::Object(clean_object(map)),
        other => other.clone(),
    };
    Ok(Some(normalized))
}

fn toggle(flag: bool) -> &'static str {
    if flag { "enable" } else { "disable" }
}

/// Shape a table argument into a list of entry objects
fn wrap_table(
    key: &str,
    value: &Value,
    field: &FieldMetadata,
    mode: BuildMode,
) -> Result<Value, ApiError> {
    let shape_error = |reason: String| ApiError::PayloadShape {
        field: key.to_string(),
        reason,
    };

    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    if items.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }

    let children = field.children.as_ref();
    let entry_key = field
        .entry_key()
        .ok_or_else(|| shape_error("table field declares no entry key".to_string()))?;

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let entry = match item {
            Value::String(_) | Value::Number(_) => {
                let mut entry = Map::new();
                let child = children.and_then(|c| c.field(entry_key));
                if let Some(v) = normalize_value(entry_key, item, child, mode)? {
                    entry.insert(entry_key.to_string(), v);
                }
                entry
            }
            Value::Object(map) => {
                let entry = normalize(map, children, mode)?;
                if !entry.contains_key(entry_key) {
                    return Err(shape_error(format!(
                        "table entry is missing its key field '{}'",
                        entry_key
                    )));
                }
                entry
            }
            other => {
                return Err(shape_error(format!(
                    "cannot build a table entry from {}",
                    other
                )));
            }
        };
        entries.push(Value::Object(entry));
    }

    Ok(Value::Array(entries))
}

/// Recursively sort keys and drop empty objects
fn clean_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(String, Value)> = map
        .iter()
        .map(|(k, v)| (k.clone(), clean_value(v)))
        .filter(|(_, v)| !is_empty_object(v))
        .collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    entries.into_iter().collect()
}

fn clean_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(clean_object(map)),
        Value::Array(items) => Value::Array(items.iter().map(clean_value).collect()),
        other => other.clone(),
    }
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty)
}
