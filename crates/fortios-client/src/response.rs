//! Response shaping
//!
//! Every call produces an [`ApiResponse`] envelope. The caller receives it in
//! one of three shapes selected by [`ResponseMode`]:
//!
//! - [`RawResult`]: status code and body text exactly as received
//! - [`ApiResponse`] (dict): parsed JSON with key access
//! - [`ObjectResponse`]: results as [`FortiObject`]s with attribute access
//!
//! All three implement [`ResponseAccess`], so success checks and the
//! name/mkey/results accessors behave identically in every mode.

use crate::common::query::scalar_to_string;
use crate::config::ResponseMode;
use crate::error::{ApiError, describe_error_code};
use crate::transport::RawResponse;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

/// What the request addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// One resource, identified by its primary key
    Single,
    /// A keyed collection
    Collection,
    /// An unkeyed resource; results keep the shape the appliance returned
    AsReturned,
}

/// Results as a singleton or a list
#[derive(Debug, Clone, PartialEq)]
pub enum Results<T = Value> {
    Single(T),
    List(Vec<T>),
}

impl<T> Results<T> {
    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    /// Number of results (a singleton counts as one)
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::List(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The singleton, if this is one
    pub fn single(self) -> Option<T> {
        match self {
            Self::Single(item) => Some(item),
            Self::List(_) => None,
        }
    }

    /// Flatten into a list
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Single(item) => vec![item],
            Self::List(items) => items,
        }
    }

    /// Convert every result, keeping the shape
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<Results<U>, E> {
        Ok(match self {
            Self::Single(item) => Results::Single(f(item)?),
            Self::List(items) => Results::List(items.into_iter().map(f).collect::<Result<_, _>>()?),
        })
    }
}

/// Parsed response envelope (the dict shape)
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    path: String,
    http_status: u16,
    raw: String,
    body: Value,
    cardinality: Cardinality,
    mkey_field: Option<String>,
    success: bool,
    error: Option<ApiError>,
}

impl ApiResponse {
    /// Build the envelope for a received response
    ///
    /// # Arguments
    /// * `path` - Endpoint path the request addressed
    /// * `raw` - Status and body as received
    /// * `cardinality` - What the request addressed
    pub fn from_raw(path: impl Into<String>, raw: RawResponse, cardinality: Cardinality) -> Self {
        let path = path.into();
        let body = serde_json::from_str(&raw.body).unwrap_or(Value::Null);
        let embedded_ok = body
            .get("status")
            .and_then(Value::as_str)
            .is_none_or(|status| status == "success");
        let success = (200..300).contains(&raw.status) && embedded_ok;

        let error = (!success).then(|| api_error(&path, raw.status, &raw.body, &body));
        if let Some(err) = &error {
            debug!("Unsuccessful response: {}", err);
        }

        Self {
            path,
            http_status: raw.status,
            raw: raw.body,
            body,
            cardinality,
            mkey_field: None,
            success,
            error,
        }
    }

    /// Envelope for a call that failed before (or instead of) a response
    pub fn failed(path: impl Into<String>, error: ApiError) -> Self {
        Self {
            path: path.into(),
            http_status: 0,
            raw: String::new(),
            body: Value::Null,
            cardinality: Cardinality::AsReturned,
            mkey_field: None,
            success: false,
            error: Some(error),
        }
    }

    /// Name of the primary-key field, used to read the mkey out of a singleton result
    #[must_use]
    pub fn with_mkey_field(mut self, mkey_field: Option<&str>) -> Self {
        self.mkey_field = mkey_field.map(str::to_string);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// HTTP status (0 when no request was sent)
    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    /// Body text as received
    pub fn text(&self) -> &str {
        &self.raw
    }

    /// Parsed body (`Null` when the body is not JSON)
    pub fn json(&self) -> &Value {
        &self.body
    }

    /// Top-level key of the parsed body
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Convert an unsuccessful envelope into its error
    pub fn into_result(self) -> Result<Self, ApiError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Embedded status string (`success` / `error`), when present
    pub fn status(&self) -> Option<&str> {
        self.body.get("status").and_then(Value::as_str)
    }

    pub fn vdom(&self) -> Option<&str> {
        self.body.get("vdom").and_then(Value::as_str)
    }

    pub fn serial(&self) -> Option<&str> {
        self.body.get("serial").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.body.get("version").and_then(Value::as_str)
    }

    /// Name of the single object the request addressed
    ///
    /// The envelope's own top-level `name` is the table name (`address`),
    /// never the object's, so only the singleton result is consulted.
    pub fn get_name(&self) -> Result<String, ApiError> {
        match self.get_results()? {
            Results::Single(item) => item
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ApiError::field_not_present("name")),
            Results::List(_) => Err(ApiError::field_not_present("name")),
        }
    }

    /// Primary key of the created, changed or fetched object
    pub fn get_mkey(&self) -> Result<String, ApiError> {
        if let Some(mkey) = self.body.get("mkey").filter(|v| !v.is_null()) {
            return Ok(scalar_to_string(mkey));
        }
        let field = self
            .mkey_field
            .as_deref()
            .ok_or_else(|| ApiError::field_not_present("mkey"))?;
        match self.get_results()? {
            Results::Single(item) => item
                .get(field)
                .filter(|v| !v.is_null())
                .map(scalar_to_string)
                .ok_or_else(|| ApiError::field_not_present(field)),
            Results::List(_) => Err(ApiError::field_not_present("mkey")),
        }
    }

    /// Results shaped by what the request addressed
    pub fn get_results(&self) -> Result<Results, ApiError> {
        let results = self
            .body
            .get("results")
            .ok_or_else(|| ApiError::field_not_present("results"))?;

        match (self.cardinality, results) {
            (Cardinality::Single, Value::Array(items)) => match items.as_slice() {
                [] => Err(ApiError::field_not_present("results[0]")),
                [item, ..] => Ok(Results::Single(item.clone())),
            },
            (Cardinality::Collection, Value::Array(items)) => Ok(Results::List(items.clone())),
            (Cardinality::Collection, Value::Null) => Err(ApiError::field_not_present("results")),
            (Cardinality::Collection, item) => Ok(Results::List(vec![item.clone()])),
            (Cardinality::AsReturned, Value::Array(items)) => Ok(Results::List(items.clone())),
            (_, Value::Null) => Err(ApiError::field_not_present("results")),
            (_, item) => Ok(Results::Single(item.clone())),
        }
    }
}

/// Build the error for an unsuccessful response
fn api_error(path: &str, status: u16, raw: &str, body: &Value) -> ApiError {
    let code = body.get("error").and_then(Value::as_i64);
    let text_field = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let message = code
        .and_then(describe_error_code)
        .map(str::to_string)
        .or_else(|| text_field("cli_error"))
        .or_else(|| text_field("message"))
        .or_else(|| {
            let trimmed = raw.trim();
            (!trimmed.is_empty() && body.is_null()).then(|| trimmed.chars().take(200).collect())
        })
        .unwrap_or_else(|| match code {
            Some(code) => format!("request failed with error code {}", code),
            None => format!("request failed with HTTP {}", status),
        });

    ApiError::Api {
        path: path.to_string(),
        status,
        code,
        message,
    }
}

/// Uniform accessors shared by every response shape
pub trait ResponseAccess {
    fn envelope(&self) -> &ApiResponse;

    fn is_success(&self) -> bool {
        self.envelope().is_success()
    }

    fn http_status(&self) -> u16 {
        self.envelope().http_status()
    }

    fn error(&self) -> Option<&ApiError> {
        self.envelope().error()
    }

    fn get_name(&self) -> Result<String, ApiError> {
        self.envelope().get_name()
    }

    fn get_mkey(&self) -> Result<String, ApiError> {
        self.envelope().get_mkey()
    }

    fn get_results(&self) -> Result<Results, ApiError> {
        self.envelope().get_results()
    }
}

impl ResponseAccess for ApiResponse {
    fn envelope(&self) -> &ApiResponse {
        self
    }
}

/// Status code and body text, unparsed
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult(ApiResponse);

impl RawResult {
    pub fn status(&self) -> u16 {
        self.0.http_status()
    }

    pub fn text(&self) -> &str {
        self.0.text()
    }

    pub fn into_envelope(self) -> ApiResponse {
        self.0
    }
}

impl ResponseAccess for RawResult {
    fn envelope(&self) -> &ApiResponse {
        &self.0
    }
}

/// Results with attribute-style access
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectResponse(ApiResponse);

impl ObjectResponse {
    /// Results as objects, shaped like [`ApiResponse::get_results`]
    pub fn results(&self) -> Result<Results<FortiObject>, ApiError> {
        self.0.get_results()?.try_map(FortiObject::from_value)
    }

    /// The singleton result
    pub fn object(&self) -> Result<FortiObject, ApiError> {
        self.results()?
            .single()
            .ok_or_else(|| ApiError::field_not_present("results"))
    }

    pub fn into_envelope(self) -> ApiResponse {
        self.0
    }
}

impl ResponseAccess for ObjectResponse {
    fn envelope(&self) -> &ApiResponse {
        &self.0
    }
}

/// One API object with attribute access
///
/// Attribute names are matched exactly first, then with underscores and
/// hyphens swapped, so `obj.attr("schedule_timeout")` finds `schedule-timeout`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FortiObject(Map<String, Value>);

impl FortiObject {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON object; other values are rejected
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ApiError::Serialization(format!(
                "result is not an object: {}",
                other
            ))),
        }
    }

    /// Attribute value by name
    pub fn attr(&self, name: &str) -> Result<&Value, ApiError> {
        self.0
            .get(name)
            .or_else(|| self.0.get(&name.replace('_', "-")))
            .or_else(|| self.0.get(&name.replace('-', "_")))
            .ok_or_else(|| ApiError::field_not_present(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.attr(name).is_ok()
    }

    /// Attribute deserialized into `T`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ApiError> {
        Ok(serde_json::from_value(self.attr(name)?.clone())?)
    }

    /// Attribute as text; numbers and toggles are rendered as the appliance shows them
    pub fn text(&self, name: &str) -> Result<String, ApiError> {
        Ok(scalar_to_string(self.attr(name)?))
    }

    /// Nested object attribute
    pub fn child(&self, name: &str) -> Result<FortiObject, ApiError> {
        Self::from_value(self.attr(name)?.clone())
    }

    /// Entry names of a table attribute (`srcaddr` → `["web", "db"]`)
    pub fn names(&self, name: &str) -> Result<Vec<String>, ApiError> {
        let entries = self
            .attr(name)?
            .as_array()
            .ok_or_else(|| ApiError::field_not_present(name))?;

        entries
            .iter()
            .map(|entry| match entry {
                Value::Object(fields) => fields
                    .get("name")
                    .or_else(|| fields.get("q_origin_key"))
                    .map(scalar_to_string)
                    .ok_or_else(|| ApiError::field_not_present(format!("{}.name", name))),
                scalar => Ok(scalar_to_string(scalar)),
            })
            .collect()
    }

    /// Attribute names in response order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Deserialize the whole object into a caller-defined type
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        Ok(serde_json::from_value(Value::Object(self.0))?)
    }
}

/// A response in the shape the caller asked for
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Raw(RawResult),
    Dict(ApiResponse),
    Object(ObjectResponse),
}

impl Response {
    /// Shape an envelope for the given mode
    pub fn shape(envelope: ApiResponse, mode: ResponseMode) -> Self {
        match mode {
            ResponseMode::Raw => Self::Raw(RawResult(envelope)),
            ResponseMode::Dict => Self::Dict(envelope),
            ResponseMode::Object => Self::Object(ObjectResponse(envelope)),
        }
    }

    pub fn mode(&self) -> ResponseMode {
        match self {
            Self::Raw(_) => ResponseMode::Raw,
            Self::Dict(_) => ResponseMode::Dict,
            Self::Object(_) => ResponseMode::Object,
        }
    }

    pub fn as_raw(&self) -> Option<&RawResult> {
        match self {
            Self::Raw(raw) => Some(raw),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&ApiResponse> {
        match self {
            Self::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectResponse> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The underlying envelope, whatever the shape
    pub fn into_envelope(self) -> ApiResponse {
        match self {
            Self::Raw(raw) => raw.into_envelope(),
            Self::Dict(dict) => dict,
            Self::Object(object) => object.into_envelope(),
        }
    }
}

impl ResponseAccess for Response {
    fn envelope(&self) -> &ApiResponse {
        match self {
            Self::Raw(raw) => raw.envelope(),
            Self::Dict(dict) => dict,
            Self::Object(object) => object.envelope(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn envelope(body: Value, cardinality: Cardinality) -> ApiResponse {
        ApiResponse::from_raw("cmdb/firewall/address", RawResponse::ok_json(&body), cardinality)
            .with_mkey_field(Some("name"))
    }

    fn address_body(results: Value) -> Value {
        json!({
            "http_method": "GET",
            "results": results,
            "vdom": "root",
            "path": "firewall",
            "name": "address",
            "status": "success",
            "http_status": 200,
            "serial": "FGVM01TM00000000",
            "version": "v7.4.3",
        })
    }

    #[test]
    fn keyed_get_returns_a_singleton() {
        let response = envelope(
            address_body(json!([{"name": "web01", "subnet": "10.0.0.1 255.255.255.255"}])),
            Cardinality::Single,
        );

        let results = response.get_results().expect("results");
        assert!(results.is_single());
        assert_eq!(results.single().and_then(|r| r.get("name").cloned()), Some(json!("web01")));
        assert_eq!(response.get_mkey().expect("mkey"), "web01");
        assert_eq!(response.vdom(), Some("root"));
    }

    #[test]
    fn collection_get_returns_a_list_even_when_empty() {
        let empty = envelope(address_body(json!([])), Cardinality::Collection);
        let one = envelope(address_body(json!([{"name": "web01"}])), Cardinality::Collection);

        assert_eq!(empty.get_results().expect("results"), Results::List(Vec::new()));
        assert_eq!(
            one.get_results().expect("results"),
            Results::List(vec![json!({"name": "web01"})])
        );
    }

    #[test]
    fn collection_answered_with_object_becomes_one_element_list() {
        let response = envelope(address_body(json!({"name": "web01"})), Cardinality::Collection);
        assert_eq!(response.get_results().expect("results").len(), 1);
        assert!(!response.get_results().expect("results").is_single());
    }

    #[test]
    fn unkeyed_resources_keep_their_shape() {
        let status = envelope(json!({"status": "success", "results": {"hostname": "fw1"}}), Cardinality::AsReturned);
        let sessions = envelope(json!({"status": "success", "results": [{"proto": 6}]}), Cardinality::AsReturned);

        assert!(status.get_results().expect("results").is_single());
        assert!(!sessions.get_results().expect("results").is_single());
    }

    #[test]
    fn http_200_with_embedded_error_is_not_success() {
        let response = envelope(
            json!({"status": "error", "http_status": 500, "error": -5}),
            Cardinality::Single,
        );

        assert!(!response.is_success());
        match response.error() {
            Some(ApiError::Api { status, code, message, .. }) => {
                assert_eq!(*status, 200);
                assert_eq!(*code, Some(-5));
                assert!(message.contains("duplicate"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn error_status_without_json_uses_body_text() {
        let response = ApiResponse::from_raw(
            "cmdb/firewall/address",
            RawResponse::new(502, "Bad Gateway"),
            Cardinality::Collection,
        );

        assert!(!response.is_success());
        let err = response.into_result().expect_err("unsuccessful");
        assert_eq!(
            err,
            ApiError::Api {
                path: "cmdb/firewall/address".to_string(),
                status: 502,
                code: None,
                message: "Bad Gateway".to_string(),
            }
        );
        assert!(err.is_breaker_failure());
    }

    #[test]
    fn accessors_report_shape_mismatch() {
        let response = envelope(json!({"status": "success"}), Cardinality::Collection);

        assert_eq!(
            response.get_results().expect_err("no results"),
            ApiError::FieldNotPresent {
                field: "results".to_string()
            }
        );
        assert!(matches!(response.get_mkey(), Err(ApiError::FieldNotPresent { .. })));
        assert!(matches!(response.get_name(), Err(ApiError::FieldNotPresent { .. })));
    }

    #[test]
    fn write_responses_carry_mkey_at_top_level() {
        let response = envelope(
            json!({"http_method": "POST", "status": "success", "mkey": 12, "name": "policy"}),
            Cardinality::Collection,
        );

        assert_eq!(response.get_mkey().expect("mkey"), "12");
        assert!(matches!(response.get_name(), Err(ApiError::FieldNotPresent { .. })));
    }

    #[test]
    fn get_name_reads_the_object_not_the_table() {
        let keyed = envelope(address_body(json!([{"name": "web01"}])), Cardinality::Single);
        let listed = envelope(address_body(json!([{"name": "web01"}])), Cardinality::Collection);

        assert_eq!(keyed.get_name().expect("name"), "web01");
        assert_eq!(
            listed.get_name().expect_err("list has no single name"),
            ApiError::FieldNotPresent {
                field: "name".to_string()
            }
        );
    }

    #[test]
    fn object_mode_gives_attribute_access() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Policy {
            policyid: u32,
            action: String,
        }

        let response = Response::shape(
            envelope(
                json!({"status": "success", "results": [{
                    "policyid": 7,
                    "action": "accept",
                    "schedule-timeout": "disable",
                    "srcaddr": [{"name": "web", "q_origin_key": "web"}, {"name": "db"}],
                }]}),
                Cardinality::Single,
            ),
            ResponseMode::Object,
        );

        let object = response.as_object().expect("object shape").object().expect("singleton");
        assert_eq!(object.text("schedule_timeout").expect("attr"), "disable");
        assert_eq!(object.get::<u32>("policyid").expect("policyid"), 7);
        assert_eq!(object.names("srcaddr").expect("names"), ["web", "db"]);
        assert!(matches!(object.attr("dstaddr"), Err(ApiError::FieldNotPresent { .. })));
        assert_eq!(
            object.into_typed::<Policy>().expect("typed"),
            Policy {
                policyid: 7,
                action: "accept".to_string()
            }
        );
    }

    #[test]
    fn every_shape_shares_the_accessors() {
        let body = address_body(json!([{"name": "web01"}]));
        for mode in [ResponseMode::Raw, ResponseMode::Dict, ResponseMode::Object] {
            let response = Response::shape(envelope(body.clone(), Cardinality::Single), mode);
            assert_eq!(response.mode(), mode);
            assert!(response.is_success());
            assert_eq!(response.http_status(), 200);
            assert_eq!(response.get_mkey().expect("mkey"), "web01");
        }

        let raw = Response::shape(envelope(body.clone(), Cardinality::Single), ResponseMode::Raw);
        assert_eq!(raw.as_raw().map(RawResult::text), Some(body.to_string().as_str()));
    }

    #[test]
    fn failed_envelope_carries_the_error() {
        let err = ApiError::CircuitOpen {
            target: "fw1/root".to_string(),
            retry_after: std::time::Duration::from_secs(30),
        };
        let response = Response::shape(
            ApiResponse::failed("cmdb/firewall/address", err.clone()),
            ResponseMode::Dict,
        );

        assert!(!response.is_success());
        assert_eq!(response.error(), Some(&err));
        assert_eq!(response.http_status(), 0);
    }
}
