//! Endpoint dispatch
//!
//! The dispatch tree is built once, at client construction, from the schema
//! catalog: a map from path segments to an immutable [`EndpointDescriptor`].
//! Namespaces are thin cursors over that map and resolve lazily.
//!
//! ```text
//! client.api().cmdb().child("firewall").endpoint("address")?   // cmdb/firewall/address
//! client.endpoint("monitor/system/status")?
//! ```

pub mod endpoint;

use crate::client::FortiOSClient;
use crate::common::query::encode_mkey;
use crate::error::ApiError;
use fortios_schema::{Catalog, Category, Method, MetadataStore};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

pub use endpoint::{CallOptions, Endpoint};

/// API version prefix of every URL
pub const API_PREFIX: &str = "/api/v2";

/// One endpoint, as the runtime dispatches it
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescriptor {
    segments: Vec<String>,
    category: Category,
    methods: BTreeSet<Method>,
    base_path: String,
    metadata: Arc<MetadataStore>,
}

impl EndpointDescriptor {
    pub fn new(
        segments: Vec<String>,
        category: Category,
        methods: impl IntoIterator<Item = Method>,
        metadata: MetadataStore,
    ) -> Self {
        let base_path = format!("{}/{}", API_PREFIX, segments.join("/"));
        Self {
            segments,
            category,
            methods: methods.into_iter().collect(),
            base_path,
            metadata: Arc::new(metadata),
        }
    }

    /// Path without the API prefix (`cmdb/firewall/address`)
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Primary-key field name, if the endpoint is a keyed table
    pub fn mkey(&self) -> Option<&str> {
        self.metadata.mkey()
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn allowed_methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.methods.iter().copied()
    }

    pub fn allows(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }

    /// Fail with `MethodNotAllowed` unless `method` is accepted
    pub fn check_method(&self, method: Method) -> Result<(), ApiError> {
        if self.allows(method) {
            Ok(())
        } else {
            Err(ApiError::MethodNotAllowed {
                method,
                path: self.path(),
                allowed: self.methods.iter().map(|m| m.as_str().to_string()).collect(),
            })
        }
    }

    /// URL path, with the escaped primary key appended when given
    pub fn url(&self, mkey: Option<&Value>) -> String {
        match mkey {
            Some(mkey) => format!("{}/{}", self.base_path, encode_mkey(mkey)),
            None => self.base_path.clone(),
        }
    }
}

/// Every endpoint, keyed by its path segments
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: BTreeMap<Vec<String>, Arc<EndpointDescriptor>>,
}

impl EndpointRegistry {
    /// Build the registry from a checked catalog
    pub fn from_catalog(catalog: &Catalog) -> Result<Self, ApiError> {
        let mut endpoints = BTreeMap::new();

        for entry in &catalog.endpoints {
            let category = entry.category().ok_or_else(|| {
                ApiError::InvalidConfig(format!("endpoint '{}' has no known category", entry.path))
            })?;
            let segments: Vec<String> = entry.segments().into_iter().map(str::to_string).collect();
            let descriptor = EndpointDescriptor::new(
                segments.clone(),
                category,
                entry.methods.iter().copied(),
                entry.metadata.clone(),
            );
            endpoints.insert(segments, Arc::new(descriptor));
        }

        debug!("Endpoint registry built with {} endpoints", endpoints.len());
        Ok(Self { endpoints })
    }

    /// Add or replace one descriptor
    pub fn insert(&mut self, descriptor: EndpointDescriptor) {
        self.endpoints
            .insert(descriptor.segments.clone(), Arc::new(descriptor));
    }

    /// Resolve path segments to a descriptor
    pub fn resolve<S: AsRef<str>>(&self, path: &[S]) -> Result<Arc<EndpointDescriptor>, ApiError> {
        let key: Vec<String> = path.iter().map(|s| s.as_ref().to_string()).collect();
        self.endpoints
            .get(&key)
            .cloned()
            .ok_or_else(|| ApiError::UnknownEndpoint { path: key.join("/") })
    }

    /// Resolve a path string
    ///
    /// Slash-separated paths are split on `/`; a path without slashes is split
    /// on `.` (`cmdb.firewall.address`).
    pub fn resolve_path(&self, path: &str) -> Result<Arc<EndpointDescriptor>, ApiError> {
        let separator = if path.contains('/') { '/' } else { '.' };
        let segments: Vec<&str> = path.split(separator).filter(|s| !s.is_empty()).collect();
        self.resolve(&segments)
    }

    /// Next path segments below `prefix`
    pub fn children<S: AsRef<str>>(&self, prefix: &[S]) -> Vec<String> {
        let children: BTreeSet<&str> = self
            .endpoints
            .keys()
            .filter(|key| {
                key.len() > prefix.len()
                    && key.iter().zip(prefix).all(|(a, b)| a.as_str() == b.as_ref())
            })
            .map(|key| key[prefix.len()].as_str())
            .collect();
        children.into_iter().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// All descriptors, ordered by path
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EndpointDescriptor>> {
        self.endpoints.values()
    }
}

/// Root of the dispatch tree
#[derive(Debug, Clone, Copy)]
pub struct Api<'c> {
    client: &'c FortiOSClient,
}

impl<'c> Api<'c> {
    pub(crate) fn new(client: &'c FortiOSClient) -> Self {
        Self { client }
    }

    /// Namespace for a category
    pub fn category(&self, category: Category) -> Namespace<'c> {
        Namespace {
            client: self.client,
            segments: vec![category.as_str().to_string()],
        }
    }

    /// Configuration database
    pub fn cmdb(&self) -> Namespace<'c> {
        self.category(Category::Cmdb)
    }

    /// Live state
    pub fn monitor(&self) -> Namespace<'c> {
        self.category(Category::Monitor)
    }

    pub fn log(&self) -> Namespace<'c> {
        self.category(Category::Log)
    }

    pub fn service(&self) -> Namespace<'c> {
        self.category(Category::Service)
    }
}

/// A position in the dispatch tree
#[derive(Debug, Clone)]
pub struct Namespace<'c> {
    client: &'c FortiOSClient,
    segments: Vec<String>,
}

impl<'c> Namespace<'c> {
    /// Descend one segment (`firewall`, `firewall.service`, ...)
    #[must_use]
    pub fn child(&self, segment: &str) -> Namespace<'c> {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Namespace {
            client: self.client,
            segments,
        }
    }

    /// Resolve an endpoint directly below this namespace
    pub fn endpoint(&self, segment: &str) -> Result<Endpoint<'c>, ApiError> {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        let descriptor = self.client.registry().resolve(&segments)?;
        Ok(Endpoint::new(self.client, descriptor))
    }

    /// Next segments available below this namespace
    pub fn children(&self) -> Vec<String> {
        self.client.registry().children(&self.segments)
    }

    pub fn path(&self) -> String {
        self.segments.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fortios_schema::{FieldMetadata, FieldType};
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::from_json_str(
            r#"{
                "endpoints": [
                    {"path": "cmdb/firewall/address", "methods": ["GET", "POST", "PUT", "DELETE"], "mkey": "name",
                     "fields": [{"name": "name", "type": "string", "required": true}]},
                    {"path": "cmdb/firewall/policy", "methods": ["GET", "POST", "PUT", "DELETE"], "mkey": "policyid",
                     "fields": [{"name": "policyid", "type": "integer"}]},
                    {"path": "cmdb/firewall.service/custom", "methods": ["GET"], "mkey": "name"},
                    {"path": "monitor/system/status", "methods": ["GET"]}
                ]
            }"#,
        )
        .expect("catalog parses")
    }

    #[test]
    fn resolves_known_paths() {
        let registry = EndpointRegistry::from_catalog(&catalog()).expect("registry");

        let address = registry
            .resolve(&["cmdb", "firewall", "address"])
            .expect("address endpoint");
        assert_eq!(address.category(), Category::Cmdb);
        assert_eq!(address.mkey(), Some("name"));
        assert_eq!(address.url(None), "/api/v2/cmdb/firewall/address");

        let status = registry.resolve_path("monitor.system.status").expect("dotted path");
        assert_eq!(status.mkey(), None);

        let service = registry
            .resolve_path("cmdb/firewall.service/custom")
            .expect("dotted segment");
        assert_eq!(service.segments().len(), 3);
    }

    #[test]
    fn unknown_path_is_an_error() {
        let registry = EndpointRegistry::from_catalog(&catalog()).expect("registry");
        let err = registry
            .resolve(&["cmdb", "firewall", "nope"])
            .expect_err("unknown endpoint");

        assert_eq!(
            err,
            ApiError::UnknownEndpoint {
                path: "cmdb/firewall/nope".to_string()
            }
        );
    }

    #[test]
    fn method_check_lists_allowed_verbs() {
        let registry = EndpointRegistry::from_catalog(&catalog()).expect("registry");
        let status = registry.resolve_path("monitor/system/status").expect("status");

        status.check_method(Method::Get).expect("GET allowed");
        let err = status.check_method(Method::Delete).expect_err("DELETE not allowed");
        assert_eq!(err.to_string(), "Method DELETE not allowed on monitor/system/status (allowed: GET)");
    }

    #[test]
    fn children_lists_next_segments() {
        let registry = EndpointRegistry::from_catalog(&catalog()).expect("registry");

        assert_eq!(registry.children(&["cmdb"]), ["firewall", "firewall.service"]);
        assert_eq!(registry.children(&["cmdb", "firewall"]), ["address", "policy"]);
        assert!(registry.children(&["log"]).is_empty());
    }

    #[test]
    fn mkey_is_escaped_into_one_segment() {
        let descriptor = EndpointDescriptor::new(
            vec!["cmdb".into(), "router".into(), "static".into()],
            Category::Cmdb,
            [Method::Get],
            MetadataStore::keyed("seq-num").with_field(FieldMetadata::new("seq-num", FieldType::Integer)),
        );

        assert_eq!(descriptor.url(Some(&json!(3))), "/api/v2/cmdb/router/static/3");
        assert_eq!(
            descriptor.url(Some(&json!("net/24"))),
            "/api/v2/cmdb/router/static/net%2F24"
        );
    }
}
