//! Schema loading errors

use thiserror::Error;

/// Errors that can occur while loading or checking endpoint metadata
#[derive(Debug, Error)]
pub enum SchemaError {
    /// JSON document could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML document could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Metadata file could not be read
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Two endpoints declare the same path
    #[error("Duplicate endpoint path: {0}")]
    DuplicateEndpoint(String),

    /// Endpoint path does not start with a known category
    #[error("Unknown category in endpoint path: {0}")]
    UnknownCategory(String),

    /// A field declaration is internally inconsistent
    #[error("Invalid field '{field}' in {endpoint}: {reason}")]
    InvalidField {
        endpoint: String,
        field: String,
        reason: String,
    },
}
