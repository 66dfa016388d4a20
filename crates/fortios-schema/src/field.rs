//! Field metadata
//!
//! Describes a single attribute of an API object as declared by the generated
//! schema: its wire type, value constraints, enum domain, default and, for
//! table attributes, the schema of each table entry.

use crate::store::MetadataStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared wire type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    String,
    VarString,
    Password,
    User,
    Integer,
    /// Enumerated value; the domain lives in [`FieldMetadata::options`]
    Option,
    Ipv4Address,
    Ipv4AddressAny,
    Ipv4Classnet,
    Ipv4Netmask,
    Ipv6Address,
    Ipv6Prefix,
    MacAddress,
    Uuid,
    Datetime,
    /// List of nested objects described by [`FieldMetadata::children`]
    Table,
    /// Any type the runtime does not interpret
    #[serde(other)]
    Other,
}

impl FieldType {
    /// Wire name as it appears in schema documents
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::VarString => "var-string",
            Self::Password => "password",
            Self::User => "user",
            Self::Integer => "integer",
            Self::Option => "option",
            Self::Ipv4Address => "ipv4-address",
            Self::Ipv4AddressAny => "ipv4-address-any",
            Self::Ipv4Classnet => "ipv4-classnet",
            Self::Ipv4Netmask => "ipv4-netmask",
            Self::Ipv6Address => "ipv6-address",
            Self::Ipv6Prefix => "ipv6-prefix",
            Self::MacAddress => "mac-address",
            Self::Uuid => "uuid",
            Self::Datetime => "datetime",
            Self::Table => "table",
            Self::Other => "other",
        }
    }

    /// Whether values of this type travel as JSON strings
    pub const fn is_string_like(self) -> bool {
        !matches!(self, Self::Integer | Self::Table | Self::Other)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric range and length limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl Constraints {
    /// True when no limit is declared
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.max_length.is_none()
    }
}

/// Metadata for a single field of an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// Wire name (hyphenated, e.g. `schedule-timeout`)
    pub name: String,

    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Must be present on full-replace requests
    #[serde(default)]
    pub required: bool,

    /// `null` is a meaningful value and must be sent
    #[serde(default)]
    pub nullable: bool,

    /// Default applied by the appliance when the field is omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum domain for `option` fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,

    /// Entry schema for `table` fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<MetadataStore>,
}

impl FieldMetadata {
    /// Create a field with no constraints
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            nullable: false,
            default: None,
            options: None,
            constraints: Constraints::default(),
            children: None,
        }
    }

    /// Create an `option` field with the given domain
    pub fn option<I, S>(name: impl Into<String>, domain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut field = Self::new(name, FieldType::Option);
        field.options = Some(domain.into_iter().map(Into::into).collect());
        field
    }

    /// Create a `table` field whose entries follow `children`
    pub fn table(name: impl Into<String>, children: MetadataStore) -> Self {
        let mut field = Self::new(name, FieldType::Table);
        field.children = Some(children);
        field
    }

    /// Mark the field as required
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field as nullable
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set numeric bounds
    #[must_use]
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.constraints.min = Some(min);
        self.constraints.max = Some(max);
        self
    }

    /// Set the maximum string length
    #[must_use]
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.constraints.max_length = Some(max_length);
        self
    }

    /// Set the appliance-side default
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Whether this field is an enable/disable toggle
    pub fn is_toggle(&self) -> bool {
        self.options.as_ref().is_some_and(|domain| {
            domain.iter().any(|v| v == "enable") && domain.iter().any(|v| v == "disable")
        })
    }

    /// Key field name of table entries, if declared
    pub fn entry_key(&self) -> Option<&str> {
        self.children.as_ref().and_then(|c| c.mkey())
    }
}
