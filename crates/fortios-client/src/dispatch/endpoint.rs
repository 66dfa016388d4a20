//! Endpoint handle and per-call options

use super::EndpointDescriptor;
use crate::client::FortiOSClient;
use crate::common::query::scalar_to_string;
use crate::config::ResponseMode;
use crate::error::ApiError;
use crate::payload::{BuildMode, wire_name};
use crate::response::{Cardinality, Response};
use fortios_schema::Method;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Options recognised by every endpoint call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    /// Overrides the client's response mode for this call
    pub response_mode: Option<ResponseMode>,
    /// Overrides the client's VDOM for this call
    pub vdom: Option<String>,
    /// Query every VDOM (`scope=global`) instead of one
    pub global: bool,
    /// Primary key of the addressed object
    pub mkey: Option<Value>,
    pub start: Option<u64>,
    pub count: Option<u64>,
    /// Equality filters (`field==value`), ANDed
    pub filters: Vec<(String, Value)>,
    /// Filter expressions passed through verbatim (`name=@web`)
    pub raw_filters: Vec<String>,
    /// Fields to return (`format=name|subnet`)
    pub format: Vec<String>,
    pub datasource: bool,
    pub with_meta: bool,
    pub skip: bool,
    /// Overrides partial validation for POST/PUT
    pub partial: Option<bool>,
    pub build_mode: BuildMode,
    /// Special action, e.g. `move`
    pub action: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    /// Additional query parameters
    pub params: Vec<(String, String)>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn vdom(mut self, vdom: impl Into<String>) -> Self {
        self.vdom = Some(vdom.into());
        self
    }

    #[must_use]
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    #[must_use]
    pub fn mkey(mut self, mkey: impl Into<Value>) -> Self {
        self.mkey = Some(mkey.into());
        self
    }

    #[must_use]
    pub fn page(mut self, start: u64, count: u64) -> Self {
        self.start = Some(start);
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn raw_filter(mut self, expression: impl Into<String>) -> Self {
        self.raw_filters.push(expression.into());
        self
    }

    #[must_use]
    pub fn format<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.format = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn datasource(mut self) -> Self {
        self.datasource = true;
        self
    }

    #[must_use]
    pub fn with_meta(mut self) -> Self {
        self.with_meta = true;
        self
    }

    #[must_use]
    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    #[must_use]
    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = Some(partial);
        self
    }

    #[must_use]
    pub fn build_mode(mut self, mode: BuildMode) -> Self {
        self.build_mode = mode;
        self
    }

    /// Move the addressed entry before another one
    #[must_use]
    pub fn move_before(mut self, target: impl Into<Value>) -> Self {
        self.action = Some("move".to_string());
        self.before = Some(target.into());
        self
    }

    /// Move the addressed entry after another one
    #[must_use]
    pub fn move_after(mut self, target: impl Into<Value>) -> Self {
        self.action = Some("move".to_string());
        self.after = Some(target.into());
        self
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Equality filters as a payload, for validation
    pub(crate) fn filter_payload(&self) -> Map<String, Value> {
        self.filters.iter().cloned().collect()
    }

    /// Query parameters other than the VDOM selector
    pub(crate) fn query_pairs(&self, descriptor: &EndpointDescriptor) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &str, value: String| pairs.push((key.to_string(), value));

        for (field, value) in &self.filters {
            let field = wire_name(field, Some(descriptor.metadata()));
            push("filter", format!("{}=={}", field, scalar_to_string(value)));
        }
        for expression in &self.raw_filters {
            push("filter", expression.clone());
        }
        if !self.format.is_empty() {
            push("format", self.format.join("|"));
        }
        if let Some(start) = self.start {
            push("start", start.to_string());
        }
        if let Some(count) = self.count {
            push("count", count.to_string());
        }
        if self.datasource {
            push("datasource", "1".to_string());
        }
        if self.with_meta {
            push("with_meta", "1".to_string());
        }
        if self.skip {
            push("skip", "1".to_string());
        }
        if let Some(action) = &self.action {
            push("action", action.clone());
        }
        if let Some(before) = &self.before {
            push("before", scalar_to_string(before));
        }
        if let Some(after) = &self.after {
            push("after", scalar_to_string(after));
        }
        if self.global {
            push("scope", "global".to_string());
        }
        for (key, value) in &self.params {
            push(key, value.clone());
        }
        pairs
    }

    /// What the call addresses
    ///
    /// An mkey, or an equality filter on the mkey field, addresses one object.
    pub(crate) fn cardinality(&self, descriptor: &EndpointDescriptor) -> Cardinality {
        let Some(key_field) = descriptor.mkey() else {
            return if self.mkey.is_some() {
                Cardinality::Single
            } else {
                Cardinality::AsReturned
            };
        };

        let filtered_by_key = self
            .filters
            .iter()
            .any(|(field, _)| wire_name(field, Some(descriptor.metadata())) == key_field);
        if self.mkey.is_some() || filtered_by_key {
            Cardinality::Single
        } else {
            Cardinality::Collection
        }
    }
}

/// A resolved endpoint bound to a client
#[derive(Debug, Clone)]
pub struct Endpoint<'c> {
    client: &'c FortiOSClient,
    descriptor: Arc<EndpointDescriptor>,
}

impl<'c> Endpoint<'c> {
    pub(crate) fn new(client: &'c FortiOSClient, descriptor: Arc<EndpointDescriptor>) -> Self {
        Self { client, descriptor }
    }

    pub fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    /// Read one object (with `mkey`) or the collection
    pub async fn get(&self, options: CallOptions) -> Result<Response, ApiError> {
        self.client
            .call(&self.descriptor, Method::Get, Map::new(), options)
            .await
    }

    /// Create an object
    pub async fn post(&self, args: Map<String, Value>, options: CallOptions) -> Result<Response, ApiError> {
        self.client
            .call(&self.descriptor, Method::Post, args, options)
            .await
    }

    /// Update an object; the key comes from `options.mkey` or from `args`
    pub async fn put(&self, args: Map<String, Value>, options: CallOptions) -> Result<Response, ApiError> {
        self.client
            .call(&self.descriptor, Method::Put, args, options)
            .await
    }

    /// Delete the object addressed by `options.mkey`
    pub async fn delete(&self, options: CallOptions) -> Result<Response, ApiError> {
        self.client
            .call(&self.descriptor, Method::Delete, Map::new(), options)
            .await
    }

    /// Whether an object with this key exists.
    ///
    /// Always reports failures as `Err`, whatever the error mode.
    pub async fn exists(&self, mkey: impl Into<Value>, options: CallOptions) -> Result<bool, ApiError> {
        self.client
            .exists(&self.descriptor, mkey.into(), options)
            .await
    }

    /// Update the object if it exists, create it otherwise
    pub async fn set(&self, args: Map<String, Value>, options: CallOptions) -> Result<Response, ApiError> {
        let mkey_field = self.descriptor.mkey().ok_or_else(|| ApiError::PayloadShape {
            field: self.descriptor.path(),
            reason: "set requires a keyed endpoint".to_string(),
        })?;
        let mkey = match &options.mkey {
            Some(mkey) => mkey.clone(),
            None => args
                .iter()
                .find(|(name, _)| wire_name(name, Some(self.descriptor.metadata())) == mkey_field)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| ApiError::MissingRequiredField {
                    field: mkey_field.to_string(),
                })?,
        };

        let lookup = CallOptions {
            vdom: options.vdom.clone(),
            global: options.global,
            ..CallOptions::default()
        };
        if self.exists(mkey.clone(), lookup).await? {
            self.put(args, options.mkey(mkey)).await
        } else {
            self.post(args, CallOptions { mkey: None, ..options }).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fortios_schema::{Category, FieldMetadata, FieldType, MetadataStore};
    use serde_json::json;

    fn policy() -> EndpointDescriptor {
        EndpointDescriptor::new(
            vec!["cmdb".into(), "firewall".into(), "policy".into()],
            Category::Cmdb,
            [Method::Get, Method::Put],
            MetadataStore::keyed("policyid")
                .with_field(FieldMetadata::new("policyid", FieldType::Integer))
                .with_field(FieldMetadata::new("schedule-timeout", FieldType::String))
                .with_field(FieldMetadata::option("status", ["enable", "disable"])),
        )
    }

    #[test]
    fn query_pairs_follow_option_order() {
        let options = CallOptions::new()
            .filter("schedule_timeout", true)
            .raw_filter("name=@web")
            .format(["policyid", "name"])
            .page(0, 50)
            .with_meta()
            .global();

        assert_eq!(
            options.query_pairs(&policy()),
            vec![
                ("filter".to_string(), "schedule-timeout==enable".to_string()),
                ("filter".to_string(), "name=@web".to_string()),
                ("format".to_string(), "policyid|name".to_string()),
                ("start".to_string(), "0".to_string()),
                ("count".to_string(), "50".to_string()),
                ("with_meta".to_string(), "1".to_string()),
                ("scope".to_string(), "global".to_string()),
            ]
        );
    }

    #[test]
    fn move_sets_action_and_anchor() {
        let pairs = CallOptions::new().mkey(7).move_before(3).query_pairs(&policy());
        assert_eq!(
            pairs,
            vec![
                ("action".to_string(), "move".to_string()),
                ("before".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn cardinality_follows_the_request() {
        let keyed = policy();
        let unkeyed = EndpointDescriptor::new(
            vec!["monitor".into(), "system".into(), "status".into()],
            Category::Monitor,
            [Method::Get],
            MetadataStore::default(),
        );

        assert_eq!(CallOptions::new().mkey(1).cardinality(&keyed), Cardinality::Single);
        assert_eq!(CallOptions::new().cardinality(&keyed), Cardinality::Collection);
        assert_eq!(
            CallOptions::new().filter("policyid", 1).cardinality(&keyed),
            Cardinality::Single
        );
        assert_eq!(
            CallOptions::new().filter("status", "enable").filter("policyid", 1).cardinality(&keyed),
            Cardinality::Single
        );
        assert_eq!(
            CallOptions::new().filter("status", "enable").cardinality(&keyed),
            Cardinality::Collection
        );
        assert_eq!(
            CallOptions::new().raw_filter("policyid==1").cardinality(&keyed),
            Cardinality::Collection
        );
        assert_eq!(CallOptions::new().cardinality(&unkeyed), Cardinality::AsReturned);
    }

    #[test]
    fn filter_payload_keeps_values() {
        let payload = CallOptions::new().filter("status", "enable").filter_payload();
        assert_eq!(Value::Object(payload), json!({"status": "enable"}));
    }
}
