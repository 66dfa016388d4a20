//! Transport seam
//!
//! The runtime talks to the appliance only through [`Transport`]. The direct
//! HTTP implementation lives in [`crate::common`]; the management-plane proxy
//! in [`crate::proxy`]; tests use [`crate::mock`].

use crate::error::ApiError;
use fortios_schema::Method;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// One HTTP exchange as the runtime describes it
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Correlates log lines of one call
    pub request_id: Uuid,
    pub method: Method,
    /// Absolute API path, e.g. `/api/v2/cmdb/firewall/address/web01`
    pub path: String,
    /// Query parameters other than the VDOM selector
    pub query: Vec<(String, String)>,
    /// VDOM the request is scoped to
    pub vdom: Option<String>,
    /// JSON body for POST/PUT
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method,
            path: path.into(),
            query: Vec::new(),
            vdom: None,
            body: None,
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_vdom(mut self, vdom: Option<String>) -> Self {
        self.vdom = vdom;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query pairs including the VDOM selector, as sent on the wire
    pub fn wire_query(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(vdom) = &self.vdom {
            pairs.push(("vdom", vdom.as_str()));
        }
        pairs
    }
}

/// Status and body exactly as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 200 with a JSON body
    pub fn ok_json(body: &Value) -> Self {
        Self::new(200, body.to_string())
    }

    pub const fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// Executes requests against one appliance (or one proxied device)
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Stable identity of the target, used to key circuit breakers
    fn identity(&self) -> String;

    /// Send one request. Only transport-level failures are errors; any HTTP
    /// status, including 5xx, is returned as a `RawResponse`.
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_query_appends_vdom_last() {
        let request = ApiRequest::new(Method::Get, "/api/v2/cmdb/firewall/address")
            .with_query("format", "name|subnet")
            .with_vdom(Some("root".to_string()));

        assert_eq!(
            request.wire_query(),
            vec![("format", "name|subnet"), ("vdom", "root")]
        );
    }

    #[test]
    fn each_request_gets_a_fresh_id() {
        let a = ApiRequest::new(Method::Get, "/a");
        let b = ApiRequest::new(Method::Get, "/a");
        assert_ne!(a.request_id, b.request_id);
    }
}
