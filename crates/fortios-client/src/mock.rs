//! Mock transport for unit testing
//!
//! Replays scripted responses in order and records every request, so tests
//! can assert on what would have gone over the wire without an appliance.

use crate::error::{ApiError, TransportErrorKind};
use crate::transport::{ApiRequest, RawResponse, Transport};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scripted transport
///
/// When the script runs out, every further request gets an empty success
/// (`{"status": "success", "results": []}`).
#[derive(Debug, Clone)]
pub struct MockTransport {
    identity: String,
    script: Arc<Mutex<VecDeque<Result<RawResponse, ApiError>>>>,
    requests: Arc<Mutex<Vec<ApiRequest>>>,
}

impl MockTransport {
    /// Create a mock whose breaker identity is `identity`
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a response
    pub fn push_response(&self, response: RawResponse) {
        self.script.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a JSON response with the given status
    pub fn push_json(&self, status: u16, body: Value) {
        self.push_response(RawResponse::new(status, body.to_string()));
    }

    /// Queue a transport failure
    pub fn push_error(&self, error: ApiError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Queue a timeout
    pub fn push_timeout(&self) {
        self.push_error(ApiError::Transport {
            target: self.identity.clone(),
            kind: TransportErrorKind::Timeout,
            message: "operation timed out".to_string(),
        });
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<ApiRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Number of requests that reached the transport
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Scripted responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(RawResponse::ok_json(&json!({"status": "success", "results": []}))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fortios_schema::Method;

    #[tokio::test]
    async fn replays_script_then_falls_back_to_success() {
        let mock = MockTransport::new("fw.test");
        mock.push_json(201, json!({"status": "success"}));
        mock.push_timeout();

        let request = ApiRequest::new(Method::Get, "/api/v2/monitor/system/status");
        assert_eq!(mock.send(&request).await.expect("scripted").status, 201);
        assert!(matches!(
            mock.send(&request).await,
            Err(ApiError::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            })
        ));
        assert_eq!(mock.send(&request).await.expect("fallback").status, 200);

        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.remaining(), 0);
        assert_eq!(
            mock.last_request().map(|r| r.path),
            Some("/api/v2/monitor/system/status".to_string())
        );
    }
}
