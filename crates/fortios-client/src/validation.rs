//! Pre-flight field validation
//!
//! Checks a payload against an endpoint's field table before anything is
//! sent. Validation only reads metadata and never touches the network.

use crate::error::ApiError;
use fortios_schema::{FieldMetadata, FieldType, MetadataStore};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};
use uuid::Uuid;

/// Validation policy for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Skip the required-field check (partial updates, filtered reads)
    pub partial: bool,
    /// Reject fields the endpoint does not declare
    pub strict: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            partial: false,
            strict: true,
        }
    }
}

impl ValidationOptions {
    /// Full-replace validation: every required field must be present
    pub fn full() -> Self {
        Self::default()
    }

    /// Partial validation: only the supplied fields are checked
    pub fn partial() -> Self {
        Self {
            partial: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Validate a payload against an endpoint's field table
///
/// An empty field table means the endpoint publishes no schema; such payloads
/// are accepted as-is.
///
/// # Arguments
/// * `payload` - Body or filter arguments, keyed by wire or `snake_case` name
/// * `metadata` - Field table of the endpoint
/// * `options` - Partial/strict policy
/// * `endpoint` - Endpoint path, used in error messages
pub fn validate(
    payload: &Map<String, Value>,
    metadata: &MetadataStore,
    options: ValidationOptions,
    endpoint: &str,
) -> Result<(), ApiError> {
    if metadata.is_empty() {
        return Ok(());
    }
    validate_object(payload, metadata, options, endpoint, "")
}

fn validate_object(
    payload: &Map<String, Value>,
    metadata: &MetadataStore,
    options: ValidationOptions,
    endpoint: &str,
    prefix: &str,
) -> Result<(), ApiError> {
    let present: HashSet<&str> = payload
        .iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(name, _)| metadata.resolve_name(name))
        .collect();

    if !options.partial {
        if let Some(missing) = metadata
            .required_fields()
            .find(|f| !present.contains(f.name.as_str()))
        {
            return Err(ApiError::MissingRequiredField {
                field: qualified(prefix, &missing.name),
            });
        }
    }

    for (name, value) in payload {
        match metadata.resolve_name(name).and_then(|n| metadata.field(n)) {
            Some(field) => check_field(value, field, options, endpoint, prefix)?,
            None if options.strict => {
                return Err(ApiError::UnknownField {
                    field: qualified(prefix, name),
                    endpoint: endpoint.to_string(),
                });
            }
            None => {}
        }
    }

    Ok(())
}

fn qualified(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn check_field(
    value: &Value,
    field: &FieldMetadata,
    options: ValidationOptions,
    endpoint: &str,
    prefix: &str,
) -> Result<(), ApiError> {
    let name = qualified(prefix, &field.name);
    if value.is_null() {
        return Ok(());
    }

    match field.field_type {
        FieldType::Table => check_table(value, field, options, endpoint, &name),
        FieldType::Option => check_enum(value, field, &name),
        FieldType::Integer => check_integer(value, field, &name),
        FieldType::Other => Ok(()),
        string_like => {
            let text = scalar_text(value).ok_or_else(|| type_error(&name, string_like.as_str(), value))?;
            check_length(&text, field, &name)?;
            if !format_matches(string_like, &text) {
                return Err(type_error(&name, string_like.as_str(), value));
            }
            Ok(())
        }
    }
}

fn type_error(name: &str, expected: &str, value: &Value) -> ApiError {
    ApiError::InvalidFieldType {
        field: name.to_string(),
        expected: expected.to_string(),
        value: value.to_string(),
    }
}

/// Strings and numbers, as text
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn check_enum(value: &Value, field: &FieldMetadata, name: &str) -> Result<(), ApiError> {
    let text = match value {
        Value::Bool(true) => "enable".to_string(),
        Value::Bool(false) => "disable".to_string(),
        other => scalar_text(other).ok_or_else(|| type_error(name, "option", value))?,
    };

    let allowed = field.options.as_deref().unwrap_or_default();
    if allowed.iter().any(|candidate| *candidate == text) {
        Ok(())
    } else {
        Err(ApiError::InvalidEnumValue {
            field: name.to_string(),
            value: text,
            allowed: allowed.to_vec(),
        })
    }
}

fn check_integer(value: &Value, field: &FieldMetadata, name: &str) -> Result<(), ApiError> {
    let number = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| type_error(name, "integer", value))?;

    let violation = |constraint: String| ApiError::ConstraintViolation {
        field: name.to_string(),
        constraint,
        value: number.to_string(),
    };

    if let Some(min) = field.constraints.min {
        if number < min {
            return Err(violation(format!("min {}", min)));
        }
    }
    if let Some(max) = field.constraints.max {
        if number > max {
            return Err(violation(format!("max {}", max)));
        }
    }
    Ok(())
}

fn check_length(text: &str, field: &FieldMetadata, name: &str) -> Result<(), ApiError> {
    match field.constraints.max_length {
        Some(max_length) if text.chars().count() > max_length => {
            Err(ApiError::ConstraintViolation {
                field: name.to_string(),
                constraint: format!("max_length {}", max_length),
                value: text.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn check_table(
    value: &Value,
    field: &FieldMetadata,
    options: ValidationOptions,
    endpoint: &str,
    name: &str,
) -> Result<(), ApiError> {
    let entries = value
        .as_array()
        .ok_or_else(|| type_error(name, "table", value))?;
    let Some(children) = field.children.as_ref() else {
        return Ok(());
    };
    let entry_options = ValidationOptions {
        partial: true,
        ..options
    };
    let entry_endpoint = format!("{}/{}", endpoint, field.name);

    for entry in entries {
        let entry = entry
            .as_object()
            .ok_or_else(|| type_error(name, "table entry object", entry))?;

        if let Some(key) = children.mkey() {
            let has_key = entry
                .iter()
                .any(|(k, v)| !v.is_null() && children.resolve_name(k) == Some(key));
            if !has_key {
                return Err(ApiError::MissingRequiredField {
                    field: qualified(name, key),
                });
            }
        }

        validate_object(entry, children, entry_options, &entry_endpoint, name)?;
    }
    Ok(())
}

/// Format check for address-like and identifier types
fn format_matches(field_type: FieldType, text: &str) -> bool {
    match field_type {
        FieldType::Ipv4Address | FieldType::Ipv4AddressAny => text.parse::<Ipv4Addr>().is_ok(),
        FieldType::Ipv4Netmask => text.parse::<Ipv4Addr>().is_ok_and(is_contiguous_mask),
        FieldType::Ipv4Classnet => is_ipv4_classnet(text),
        FieldType::Ipv6Address => text.parse::<Ipv6Addr>().is_ok(),
        FieldType::Ipv6Prefix => is_ipv6_prefix(text),
        FieldType::MacAddress => is_mac_address(text),
        FieldType::Uuid => Uuid::parse_str(text).is_ok(),
        _ => true,
    }
}

fn is_contiguous_mask(mask: Ipv4Addr) -> bool {
    let bits = u32::from(mask);
    bits.leading_ones() + bits.trailing_zeros() == 32
}

/// `10.0.0.0 255.0.0.0` or `10.0.0.0/8`
fn is_ipv4_classnet(text: &str) -> bool {
    let (address, mask) = match text.split_once('/') {
        Some(parts) => parts,
        None => match text.split_once(' ') {
            Some(parts) => parts,
            None => return false,
        },
    };
    if address.trim().parse::<Ipv4Addr>().is_err() {
        return false;
    }
    let mask = mask.trim();
    match mask.parse::<u8>() {
        Ok(len) => len <= 32,
        Err(_) => mask.parse::<Ipv4Addr>().is_ok_and(is_contiguous_mask),
    }
}

fn is_ipv6_prefix(text: &str) -> bool {
    text.split_once('/').is_some_and(|(address, len)| {
        address.parse::<Ipv6Addr>().is_ok() && len.parse::<u8>().is_ok_and(|len| len <= 128)
    })
}

fn is_mac_address(text: &str) -> bool {
    let octets: Vec<&str> = text.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}
