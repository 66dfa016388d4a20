//! Per-endpoint metadata store
//!
//! A `MetadataStore` is the field table of one endpoint (or of one table
//! field's entries). It is built once from the generated schema and only ever
//! read afterwards.

use crate::error::SchemaError;
use crate::field::{FieldMetadata, FieldType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field table for one endpoint or nested table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoreDocument", into = "StoreDocument")]
pub struct MetadataStore {
    mkey: Option<String>,
    fields: BTreeMap<String, FieldMetadata>,
}

/// Serialized form: fields are a list in the generated documents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mkey: Option<String>,
    #[serde(default)]
    fields: Vec<FieldMetadata>,
}

impl From<StoreDocument> for MetadataStore {
    fn from(doc: StoreDocument) -> Self {
        doc.fields
            .into_iter()
            .fold(Self::new(doc.mkey), |store, field| store.with_field(field))
    }
}

impl From<MetadataStore> for StoreDocument {
    fn from(store: MetadataStore) -> Self {
        Self {
            mkey: store.mkey,
            fields: store.fields.into_values().collect(),
        }
    }
}

impl MetadataStore {
    /// Create an empty store keyed by `mkey`
    pub fn new(mkey: Option<String>) -> Self {
        Self {
            mkey,
            fields: BTreeMap::new(),
        }
    }

    /// Create an empty store keyed by `mkey`
    pub fn keyed(mkey: impl Into<String>) -> Self {
        Self::new(Some(mkey.into()))
    }

    /// Add a field (replacing any field with the same name)
    #[must_use]
    pub fn with_field(mut self, field: FieldMetadata) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Primary key field name
    pub fn mkey(&self) -> Option<&str> {
        self.mkey.as_deref()
    }

    /// Look up a field by its wire name
    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.get(name)
    }

    /// Map a caller-supplied argument name onto a declared wire name.
    ///
    /// Exact matches win; otherwise `snake_case` names are tried with
    /// underscores replaced by hyphens.
    pub fn resolve_name<'a>(&'a self, name: &str) -> Option<&'a str> {
        if let Some((key, _)) = self.fields.get_key_value(name) {
            return Some(key.as_str());
        }
        if !name.contains('_') {
            return None;
        }
        let hyphenated = name.replace('_', "-");
        self.fields
            .get_key_value(hyphenated.as_str())
            .map(|(key, _)| key.as_str())
    }

    /// All fields, ordered by name
    pub fn fields(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.values()
    }

    /// Fields flagged as required
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.values().filter(|f| f.required)
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no fields are declared
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check the store for declarations the runtime cannot honour.
    ///
    /// `owner` names the endpoint (or endpoint/table) for error messages.
    pub fn check(&self, owner: &str) -> Result<(), SchemaError> {
        for field in self.fields.values() {
            let invalid = |reason: &str| SchemaError::InvalidField {
                endpoint: owner.to_string(),
                field: field.name.clone(),
                reason: reason.to_string(),
            };

            match field.field_type {
                FieldType::Option => {
                    if field.options.as_ref().is_none_or(Vec::is_empty) {
                        return Err(invalid("option field without an enum domain"));
                    }
                }
                FieldType::Table => {
                    let Some(children) = &field.children else {
                        return Err(invalid("table field without an entry schema"));
                    };
                    children.check(&format!("{}/{}", owner, field.name))?;
                }
                _ => {}
            }

            if let (Some(min), Some(max)) = (field.constraints.min, field.constraints.max) {
                if min > max {
                    return Err(invalid("min is greater than max"));
                }
            }
        }
        Ok(())
    }
}
