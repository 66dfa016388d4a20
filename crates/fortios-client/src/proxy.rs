//! Management-plane proxy transport
//!
//! Reaches a managed device through a FortiManager: each request is wrapped in
//! a `sys/proxy/json` JSON-RPC call naming the device, and the device's own
//! response is unwrapped from the reply. Dispatch, normalization and
//! validation are unaware of the indirection.
//!
//! ```json
//! {"id": 1, "method": "exec", "params": [{"url": "sys/proxy/json", "data": {
//!     "target": ["adom/root/device/FGT-01"],
//!     "action": "get",
//!     "resource": "/api/v2/cmdb/firewall/address?vdom=root"
//! }}]}
//! ```

use crate::common::query::with_query;
use crate::error::{ApiError, TransportErrorKind};
use crate::transport::{ApiRequest, RawResponse, Transport};
use fortios_schema::Method;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// JSON-RPC endpoint of the manager
const JSONRPC_PATH: &str = "/jsonrpc";

/// Transport that proxies requests to one managed device
pub struct ProxyTransport {
    inner: Arc<dyn Transport>,
    adom: String,
    device: String,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ProxyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTransport")
            .field("manager", &self.inner.identity())
            .field("adom", &self.adom)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl ProxyTransport {
    /// Proxy through `inner` (a transport to the manager) to `device` in `adom`
    pub fn new(inner: Arc<dyn Transport>, adom: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            inner,
            adom: adom.into(),
            device: device.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn adom(&self) -> &str {
        &self.adom
    }

    fn envelope(&self, request: &ApiRequest) -> Value {
        let mut data = json!({
            "target": [format!("adom/{}/device/{}", self.adom, self.device)],
            "action": request.method.as_str().to_ascii_lowercase(),
            "resource": with_query(&request.path, &request.wire_query()),
        });
        if let Some(body) = &request.body {
            data["payload"] = body.clone();
        }

        json!({
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": "exec",
            "params": [{"url": "sys/proxy/json", "data": data}],
        })
    }

    /// Extract the device response from the manager's reply
    fn unwrap_reply(&self, reply: RawResponse) -> Result<RawResponse, ApiError> {
        if !(200..300).contains(&reply.status) {
            return Ok(reply);
        }

        let body: Value = serde_json::from_str(&reply.body)?;
        let result = body
            .pointer("/result/0")
            .ok_or_else(|| ApiError::field_not_present("result"))?;

        let code = result.pointer("/status/code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            return Err(ApiError::Api {
                path: "sys/proxy/json".to_string(),
                status: reply.status,
                code: Some(code),
                message: status_message(result),
            });
        }

        let entry = result
            .pointer("/data/0")
            .ok_or_else(|| ApiError::field_not_present("data"))?;
        let device_code = entry.pointer("/status/code").and_then(Value::as_i64).unwrap_or(0);
        if device_code != 0 {
            return Err(ApiError::Transport {
                target: self.identity(),
                kind: TransportErrorKind::Connect,
                message: format!("device unreachable through manager: {}", status_message(entry)),
            });
        }

        let response = entry
            .get("response")
            .ok_or_else(|| ApiError::field_not_present("response"))?;
        let status = response
            .get("http_status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(200);

        Ok(RawResponse::new(status, response.to_string()))
    }
}

fn status_message(node: &Value) -> String {
    node.pointer("/status/message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string()
}

#[async_trait::async_trait]
impl Transport for ProxyTransport {
    fn identity(&self) -> String {
        format!("{}/{}", self.inner.identity(), self.device)
    }

    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        debug!(
            "[{}] proxying {} {} to {}",
            request.request_id, request.method, request.path, self.device
        );

        let mut rpc = ApiRequest::new(Method::Post, JSONRPC_PATH)
            .with_body(self.envelope(request))
            .with_timeout(request.timeout);
        rpc.request_id = request.request_id;

        let reply = self.inner.send(&rpc).await?;
        self.unwrap_reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn proxy(mock: &Arc<MockTransport>) -> ProxyTransport {
        ProxyTransport::new(Arc::clone(mock) as Arc<dyn Transport>, "root", "FGT-01")
    }

    #[tokio::test]
    async fn wraps_request_and_unwraps_device_response() {
        let mock = Arc::new(MockTransport::new("fmg.test"));
        mock.push_json(
            200,
            json!({"id": 1, "result": [{
                "status": {"code": 0, "message": "OK"},
                "url": "sys/proxy/json",
                "data": [{
                    "status": {"code": 0, "message": "OK"},
                    "target": "FGT-01",
                    "response": {"http_status": 200, "status": "success", "results": [{"name": "web01"}]}
                }]
            }]}),
        );
        let transport = proxy(&mock);

        let request = ApiRequest::new(Method::Put, "/api/v2/cmdb/firewall/address/web01")
            .with_vdom(Some("root".to_string()))
            .with_body(json!({"comment": "x"}));
        let response = transport.send(&request).await.expect("proxied");

        assert_eq!(response.status, 200);
        let body: Value = serde_json::from_str(&response.body).expect("json");
        assert_eq!(body["results"][0]["name"], "web01");

        let sent = mock.last_request().expect("sent");
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.path, "/jsonrpc");
        let rpc_body = sent.body.expect("rpc body");
        let data = &rpc_body["params"][0]["data"];
        assert_eq!(data["target"], json!(["adom/root/device/FGT-01"]));
        assert_eq!(data["action"], "put");
        assert_eq!(data["resource"], "/api/v2/cmdb/firewall/address/web01?vdom=root");
        assert_eq!(data["payload"], json!({"comment": "x"}));
        assert_eq!(transport.identity(), "fmg.test/FGT-01");
    }

    #[tokio::test]
    async fn unreachable_device_is_a_transport_failure() {
        let mock = Arc::new(MockTransport::new("fmg.test"));
        mock.push_json(
            200,
            json!({"id": 1, "result": [{
                "status": {"code": 0, "message": "OK"},
                "data": [{"status": {"code": -2, "message": "device not reachable"}, "target": "FGT-01"}]
            }]}),
        );

        let err = proxy(&mock)
            .send(&ApiRequest::new(Method::Get, "/api/v2/monitor/system/status"))
            .await
            .expect_err("device down");

        assert!(err.is_breaker_failure());
        assert!(err.to_string().contains("device not reachable"));
    }

    #[tokio::test]
    async fn manager_error_is_reported_with_its_code() {
        let mock = Arc::new(MockTransport::new("fmg.test"));
        mock.push_json(
            200,
            json!({"id": 1, "result": [{"status": {"code": -11, "message": "No permission for the resource"}}]}),
        );

        let err = proxy(&mock)
            .send(&ApiRequest::new(Method::Get, "/api/v2/monitor/system/status"))
            .await
            .expect_err("manager refused");

        assert!(matches!(err, ApiError::Api { code: Some(-11), .. }));
        assert!(!err.is_breaker_failure());
    }
}
