//! Endpoint catalog
//!
//! The catalog is the document emitted by the schema generator: one entry per
//! endpoint with its path, allowed methods, primary key and field table.
//!
//! ```json
//! {
//!   "endpoints": [
//!     {
//!       "path": "cmdb/firewall/address",
//!       "methods": ["GET", "POST", "PUT", "DELETE"],
//!       "mkey": "name",
//!       "fields": [{"name": "name", "type": "string", "required": true}]
//!     }
//!   ]
//! }
//! ```

use crate::error::SchemaError;
use crate::store::MetadataStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// HTTP methods an endpoint may accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "delete")]
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the method changes appliance state
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level API category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Cmdb,
    Monitor,
    Log,
    Service,
}

impl Category {
    pub const ALL: [Category; 4] = [Self::Cmdb, Self::Monitor, Self::Log, Self::Service];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cmdb => "cmdb",
            Self::Monitor => "monitor",
            Self::Log => "log",
            Self::Service => "service",
        }
    }

    /// Parse the first path segment
    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == segment)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One endpoint as declared by the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointEntry {
    /// Slash-separated path starting with the category (`cmdb/firewall/policy`)
    pub path: String,

    /// Allowed methods
    pub methods: Vec<Method>,

    /// Field table; the store's mkey is the endpoint's primary key
    #[serde(flatten)]
    pub metadata: MetadataStore,
}

impl EndpointEntry {
    /// Path split into segments
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Category named by the first segment
    pub fn category(&self) -> Option<Category> {
        self.segments().first().and_then(|s| Category::from_segment(s))
    }
}

/// The full set of endpoint declarations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub endpoints: Vec<EndpointEntry>,
}

impl Catalog {
    /// Build a catalog from already-constructed entries and check it
    pub fn new(endpoints: Vec<EndpointEntry>) -> Result<Self, SchemaError> {
        let catalog = Self { endpoints };
        catalog.check()?;
        Ok(catalog)
    }

    /// Parse a JSON catalog document
    pub fn from_json_str(document: &str) -> Result<Self, SchemaError> {
        let catalog: Self = serde_json::from_str(document)?;
        catalog.check()?;
        debug!("Loaded {} endpoints from JSON catalog", catalog.endpoints.len());
        Ok(catalog)
    }

    /// Parse a YAML catalog document
    pub fn from_yaml_str(document: &str) -> Result<Self, SchemaError> {
        let catalog: Self = serde_yaml::from_str(document)?;
        catalog.check()?;
        debug!("Loaded {} endpoints from YAML catalog", catalog.endpoints.len());
        Ok(catalog)
    }

    /// Load a catalog file; `.yaml`/`.yml` files are read as YAML, anything else as JSON
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&document),
            _ => Self::from_json_str(&document),
        }
    }

    /// Merge another catalog into this one
    pub fn extend(&mut self, other: Catalog) -> Result<(), SchemaError> {
        self.endpoints.extend(other.endpoints);
        self.check()
    }

    /// Number of endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True when the catalog declares nothing
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    fn check(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            let normalized = endpoint.segments().join("/");
            if endpoint.category().is_none() {
                return Err(SchemaError::UnknownCategory(endpoint.path.clone()));
            }
            if !seen.insert(normalized.clone()) {
                return Err(SchemaError::DuplicateEndpoint(normalized));
            }
            endpoint.metadata.check(&normalized)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "endpoints": [
            {
                "path": "cmdb/firewall/address",
                "methods": ["GET", "POST", "PUT", "DELETE"],
                "mkey": "name",
                "fields": [
                    {"name": "name", "type": "string", "required": true, "constraints": {"max_length": 79}},
                    {"name": "type", "type": "option", "options": ["ipmask", "iprange", "fqdn"]}
                ]
            },
            {
                "path": "monitor/system/status",
                "methods": ["get"]
            }
        ]
    }"#;

    #[test]
    fn parses_json_catalog() {
        let catalog = Catalog::from_json_str(CATALOG).expect("catalog should parse");

        assert_eq!(catalog.len(), 2);
        let address = &catalog.endpoints[0];
        assert_eq!(address.category(), Some(Category::Cmdb));
        assert_eq!(address.metadata.mkey(), Some("name"));
        assert_eq!(address.metadata.len(), 2);
        assert_eq!(catalog.endpoints[1].methods, vec![Method::Get]);
        assert!(catalog.endpoints[1].metadata.is_empty());
    }

    #[test]
    fn parses_yaml_catalog() {
        let yaml = r#"
endpoints:
  - path: cmdb/system/interface
    methods: [GET, PUT]
    mkey: name
    fields:
      - name: name
        type: string
        required: true
      - name: mtu
        type: integer
        constraints:
          min: 68
          max: 9216
"#;
        let catalog = Catalog::from_yaml_str(yaml).expect("catalog should parse");
        let mtu = catalog.endpoints[0].metadata.field("mtu").expect("mtu declared");

        assert_eq!(mtu.constraints.min, Some(68));
        assert_eq!(mtu.constraints.max, Some(9216));
    }

    #[test]
    fn rejects_duplicate_paths() {
        let doc = r#"{"endpoints": [
            {"path": "cmdb/firewall/policy", "methods": ["GET"]},
            {"path": "/cmdb/firewall/policy/", "methods": ["GET"]}
        ]}"#;

        let err = Catalog::from_json_str(doc).expect_err("must fail");
        assert!(matches!(err, SchemaError::DuplicateEndpoint(ref p) if p == "cmdb/firewall/policy"));
    }

    #[test]
    fn rejects_unknown_category() {
        let doc = r#"{"endpoints": [{"path": "config/firewall/policy", "methods": ["GET"]}]}"#;

        let err = Catalog::from_json_str(doc).expect_err("must fail");
        assert!(matches!(err, SchemaError::UnknownCategory(_)));
    }
}
