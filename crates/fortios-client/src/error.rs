//! FortiOS client errors
//!
//! One taxonomy covers every failure the runtime can report. The configured
//! [`ErrorMode`](crate::config::ErrorMode) only decides whether an error is
//! returned as `Err` or captured inside a failed response; the variants are
//! the same either way.

use fortios_schema::Method;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Stable machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownEndpoint,
    MethodNotAllowed,
    PayloadShape,
    MissingRequiredField,
    InvalidEnumValue,
    ConstraintViolation,
    InvalidFieldType,
    UnknownField,
    CircuitOpen,
    Transport,
    FieldNotPresent,
    Api,
    ReadOnly,
    InvalidConfig,
    Serialization,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownEndpoint => "unknown_endpoint",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::PayloadShape => "payload_shape",
            Self::MissingRequiredField => "missing_required_field",
            Self::InvalidEnumValue => "invalid_enum_value",
            Self::ConstraintViolation => "constraint_violation",
            Self::InvalidFieldType => "invalid_field_type",
            Self::UnknownField => "unknown_field",
            Self::CircuitOpen => "circuit_open",
            Self::Transport => "transport",
            Self::FieldNotPresent => "field_not_present",
            Self::Api => "api",
            Self::ReadOnly => "read_only",
            Self::InvalidConfig => "invalid_config",
            Self::Serialization => "serialization",
        }
    }

    /// Validation failures detected before any request is sent
    pub const fn is_validation(self) -> bool {
        matches!(
            self,
            Self::MissingRequiredField
                | Self::InvalidEnumValue
                | Self::ConstraintViolation
                | Self::InvalidFieldType
                | Self::UnknownField
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Tls,
    Protocol,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Connect => "connection failed",
            Self::Tls => "TLS failure",
            Self::Protocol => "protocol error",
        })
    }
}

/// Errors that can occur when calling the FortiOS API
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// No endpoint is registered at the requested path
    #[error("Unknown endpoint: {path}")]
    UnknownEndpoint { path: String },

    /// The endpoint does not accept this HTTP method
    #[error("Method {method} not allowed on {path} (allowed: {})", join(.allowed))]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<String>,
    },

    /// Arguments could not be shaped into the declared wire format
    #[error("Invalid payload shape for field '{field}': {reason}")]
    PayloadShape { field: String, reason: String },

    /// A required field is absent from a full-replace payload
    #[error("Missing required field '{field}'")]
    MissingRequiredField { field: String },

    /// Value outside an enum field's domain
    #[error("Invalid value '{value}' for field '{field}' (allowed: {})", join(.allowed))]
    InvalidEnumValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Value violates a numeric range, length or format constraint
    #[error("Field '{field}' violates {constraint}: {value}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        value: String,
    },

    /// Value has the wrong JSON kind for the declared type
    #[error("Field '{field}' expects {expected}, got {value}")]
    InvalidFieldType {
        field: String,
        expected: String,
        value: String,
    },

    /// Field is not declared by the endpoint metadata
    #[error("Unknown field '{field}' for {endpoint}")]
    UnknownField { field: String, endpoint: String },

    /// Breaker for the target is open; no request was sent
    #[error("Circuit open for {target}; retry after {}ms", .retry_after.as_millis())]
    CircuitOpen { target: String, retry_after: Duration },

    /// The request could not be completed at the transport level
    #[error("Transport error ({kind}) for {target}: {message}")]
    Transport {
        target: String,
        kind: TransportErrorKind,
        message: String,
    },

    /// Response lacks the requested key
    #[error("Field '{field}' not present in response")]
    FieldNotPresent { field: String },

    /// The appliance answered with a non-success status
    #[error("API error on {path}: HTTP {status}{}: {message}", code_suffix(.code))]
    Api {
        path: String,
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// Write attempted on a read-only client
    #[error("Read-only mode: {method} {path} blocked")]
    ReadOnly { method: Method, path: String },

    /// Client configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ApiError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownEndpoint { .. } => ErrorKind::UnknownEndpoint,
            Self::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            Self::PayloadShape { .. } => ErrorKind::PayloadShape,
            Self::MissingRequiredField { .. } => ErrorKind::MissingRequiredField,
            Self::InvalidEnumValue { .. } => ErrorKind::InvalidEnumValue,
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::InvalidFieldType { .. } => ErrorKind::InvalidFieldType,
            Self::UnknownField { .. } => ErrorKind::UnknownField,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::FieldNotPresent { .. } => ErrorKind::FieldNotPresent,
            Self::Api { .. } => ErrorKind::Api,
            Self::ReadOnly { .. } => ErrorKind::ReadOnly,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether the breaker should count this outcome as a failure
    pub fn is_breaker_failure(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        self.is_breaker_failure()
    }

    pub(crate) fn field_not_present(field: impl Into<String>) -> Self {
        Self::FieldNotPresent {
            field: field.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

fn join(values: &[String]) -> String {
    values.join(", ")
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(" (error {c})")).unwrap_or_default()
}

/// Human-readable description of an embedded FortiOS error code
pub fn describe_error_code(code: i64) -> Option<&'static str> {
    let description = match code {
        -1 => "invalid length of value",
        -2 => "index value out of range",
        -3 => "entry not found",
        -4 => "maximum number of entries has been reached",
        -5 => "a duplicate entry already exists",
        -6 => "failed memory allocation",
        -7 => "value conflicts with system settings",
        -8 => "invalid IP address",
        -9 => "invalid IP netmask",
        -10 => "invalid gateway address",
        -14 => "permission denied",
        -15 => "entry is in use",
        -23 => "entry is used by another entry",
        -37 => "failed to get VDOM",
        -61 => "command parse error",
        -72 => "field value exceeds maximum length",
        -651 => "input value is invalid",
        _ => return None,
    };
    Some(description)
}
