//! FortiOS API client
//!
//! Runs every endpoint call through the same pipeline:
//!
//! ```text
//! method check → read-only guard → normalize → validate
//!     → breaker permit → send (with retries) → shape → deliver per error mode
//! ```

use crate::backoff::FibonacciBackoff;
use crate::circuit_breaker::{CircuitBreakers, CircuitSnapshot, CircuitState};
use crate::common::HttpTransport;
use crate::config::{ClientConfig, ErrorMode, ResponseMode};
use crate::dispatch::{Api, CallOptions, Endpoint, EndpointDescriptor, EndpointRegistry};
use crate::error::{ApiError, ErrorKind};
use crate::payload::{normalize, wire_name};
use crate::response::{ApiResponse, Cardinality, Response};
use crate::transport::{ApiRequest, RawResponse, Transport};
use crate::validation::{ValidationOptions, validate};
use chrono::{DateTime, Utc};
use fortios_schema::{Catalog, Method};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Number of calls kept in the operation log
const OPERATION_LOG_CAPACITY: usize = 1_000;

/// Per-call state, discarded when the call completes
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub descriptor: Arc<EndpointDescriptor>,
    pub method: Method,
    pub args: Map<String, Value>,
    pub vdom: Option<String>,
    pub response_mode: ResponseMode,
    pub cardinality: Cardinality,
}

/// One completed call, as recorded in the operation log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationRecord {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub method: Method,
    pub path: String,
    pub vdom: Option<String>,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
}

/// FortiOS REST API client
///
/// Owns its endpoint registry, transport and breaker map; two clients never
/// share breaker state.
pub struct FortiOSClient {
    config: ClientConfig,
    registry: Arc<EndpointRegistry>,
    transport: Arc<dyn Transport>,
    breakers: CircuitBreakers,
    operations: Mutex<VecDeque<OperationRecord>>,
}

impl std::fmt::Debug for FortiOSClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FortiOSClient")
            .field("config", &self.config)
            .field("endpoints", &self.registry.len())
            .field("target", &self.transport.identity())
            .finish_non_exhaustive()
    }
}

impl FortiOSClient {
    /// Create a client talking HTTP to the configured appliance
    ///
    /// # Arguments
    /// * `config` - Client configuration
    /// * `catalog` - Endpoint declarations from the schema generator
    pub fn new(config: ClientConfig, catalog: &Catalog) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, catalog, Arc::new(transport))
    }

    /// Create a client over an existing transport (proxy, mock, ...)
    pub fn with_transport(
        config: ClientConfig,
        catalog: &Catalog,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ApiError> {
        config.validate()?;
        let registry = EndpointRegistry::from_catalog(catalog)?;
        let breakers = CircuitBreakers::new(config.circuit_breaker());

        debug!(
            "FortiOS client for {} ready ({} endpoints)",
            transport.identity(),
            registry.len()
        );

        Ok(Self {
            config,
            registry: Arc::new(registry),
            transport,
            breakers,
            operations: Mutex::new(VecDeque::new()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Root of the dispatch tree
    pub fn api(&self) -> Api<'_> {
        Api::new(self)
    }

    /// Resolve an endpoint by path (`cmdb/firewall/address`)
    pub fn endpoint(&self, path: &str) -> Result<Endpoint<'_>, ApiError> {
        let descriptor = self.registry.resolve_path(path)?;
        Ok(Endpoint::new(self, descriptor))
    }

    /// Breaker state of every target called so far
    pub fn circuit_snapshots(&self) -> Vec<CircuitSnapshot> {
        self.breakers.snapshots()
    }

    /// Force a target's breaker closed
    pub fn reset_circuit(&self, target: &str) -> bool {
        self.breakers.reset(target)
    }

    /// Recent calls, oldest first
    pub fn operations(&self) -> Vec<OperationRecord> {
        self.lock_operations().iter().cloned().collect()
    }

    pub fn clear_operations(&self) {
        self.lock_operations().clear();
    }

    fn lock_operations(&self) -> std::sync::MutexGuard<'_, VecDeque<OperationRecord>> {
        self.operations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// VDOM a call runs in; none for global-scope calls
    fn call_vdom(&self, options: &CallOptions) -> Option<String> {
        if options.global {
            None
        } else {
            options.vdom.clone().or_else(|| self.config.vdom.clone())
        }
    }

    /// Breaker key for a VDOM
    fn target(&self, vdom: Option<&str>) -> String {
        match vdom {
            Some(vdom) => format!("{}/{}", self.transport.identity(), vdom),
            None => self.transport.identity(),
        }
    }

    /// Run one endpoint call and deliver the outcome per the error mode
    pub(crate) async fn call(
        &self,
        descriptor: &Arc<EndpointDescriptor>,
        method: Method,
        args: Map<String, Value>,
        options: CallOptions,
    ) -> Result<Response, ApiError> {
        let mode = options.response_mode.unwrap_or(self.config.response_mode);
        let context = RequestContext {
            request_id: Uuid::new_v4(),
            descriptor: Arc::clone(descriptor),
            method,
            args,
            vdom: self.call_vdom(&options),
            response_mode: mode,
            cardinality: options.cardinality(descriptor),
        };

        let started = Instant::now();
        let outcome = self.execute(&context, &options).await;
        self.record(&context, &outcome, started);

        match self.config.error_mode {
            ErrorMode::Raise => {
                let envelope = outcome.and_then(ApiResponse::into_result)?;
                Ok(Response::shape(envelope, mode))
            }
            ErrorMode::Return => {
                let envelope = outcome
                    .unwrap_or_else(|err| ApiResponse::failed(descriptor.path(), err));
                Ok(Response::shape(envelope, mode))
            }
        }
    }

    /// GET by key, mapping 404 to `false`
    pub(crate) async fn exists(
        &self,
        descriptor: &Arc<EndpointDescriptor>,
        mkey: Value,
        options: CallOptions,
    ) -> Result<bool, ApiError> {
        let options = CallOptions {
            mkey: Some(mkey),
            ..options
        };
        let context = RequestContext {
            request_id: Uuid::new_v4(),
            descriptor: Arc::clone(descriptor),
            method: Method::Get,
            args: Map::new(),
            vdom: self.call_vdom(&options),
            response_mode: ResponseMode::Dict,
            cardinality: Cardinality::Single,
        };

        let started = Instant::now();
        let outcome = self.execute(&context, &options).await;
        self.record(&context, &outcome, started);

        let envelope = outcome?;
        if envelope.is_success() {
            Ok(true)
        } else if envelope.http_status() == 404 {
            Ok(false)
        } else {
            envelope.into_result().map(|_| true)
        }
    }

    /// Build the request, then send it; the envelope may be unsuccessful
    async fn execute(&self, context: &RequestContext, options: &CallOptions) -> Result<ApiResponse, ApiError> {
        let descriptor = &context.descriptor;
        descriptor.check_method(context.method)?;

        if self.config.read_only && context.method.is_write() {
            warn!("[{}] {} {} blocked by read-only mode", context.request_id, context.method, descriptor.path());
            return Err(ApiError::ReadOnly {
                method: context.method,
                path: descriptor.path(),
            });
        }

        let request = self.build_request(context, options)?;
        let raw = self.send(context, &request).await?;

        Ok(ApiResponse::from_raw(descriptor.path(), raw, context.cardinality)
            .with_mkey_field(descriptor.mkey()))
    }

    fn build_request(&self, context: &RequestContext, options: &CallOptions) -> Result<ApiRequest, ApiError> {
        let descriptor = &context.descriptor;
        let metadata = descriptor.metadata();
        let endpoint = descriptor.path();
        let strict = self.config.strict_validation;

        let mut mkey = options.mkey.clone();
        let mut body = None;

        match context.method {
            Method::Get => {
                let raw_filters = options.filter_payload();
                let filters = normalize(&raw_filters, Some(metadata), options.build_mode)?;
                validate(&filters, metadata, ValidationOptions::partial().with_strict(strict), &endpoint)
                    .map_err(|err| with_caller_name(err, &raw_filters, descriptor))?;
            }
            Method::Post | Method::Put => {
                let payload = normalize(&context.args, Some(metadata), options.build_mode)?;
                let partial = options.partial.unwrap_or(false);
                validate(
                    &payload,
                    metadata,
                    ValidationOptions { partial, strict },
                    &endpoint,
                )
                .map_err(|err| with_caller_name(err, &context.args, descriptor))?;

                if context.method == Method::Put && mkey.is_none() {
                    mkey = descriptor
                        .mkey()
                        .and_then(|field| payload.get(field))
                        .cloned();
                }
                body = Some(Value::Object(payload));
            }
            Method::Delete => {}
        }

        if matches!(context.method, Method::Put | Method::Delete) && mkey.is_none() {
            if let Some(field) = descriptor.mkey() {
                return Err(ApiError::MissingRequiredField {
                    field: field.to_string(),
                });
            }
        }

        let mut request = ApiRequest::new(context.method, descriptor.url(mkey.as_ref()))
            .with_vdom(context.vdom.clone())
            .with_timeout(self.config.request_timeout());
        request.request_id = context.request_id;
        request.query = options.query_pairs(descriptor);
        if let Some(body) = body {
            request = request.with_body(body);
        }
        Ok(request)
    }

    /// Send through the target's breaker, retrying server and transport failures
    ///
    /// POST is never retried: a create that failed server-side may still have
    /// been applied.
    async fn send(&self, context: &RequestContext, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        let target = self.target(context.vdom.as_deref());
        let breaker = self.breakers.for_target(&target);
        let mut backoff = FibonacciBackoff::default();
        let max_retries = if request.method == Method::Post {
            0
        } else {
            self.config.max_retries
        };
        let mut attempt = 0;

        loop {
            let permit = breaker.try_acquire()?;
            let result = self.transport.send(request).await;

            let failure = match &result {
                Ok(raw) => raw.is_server_error(),
                Err(err) => err.is_breaker_failure(),
            };
            if !failure {
                permit.succeed();
                return result;
            }
            permit.fail();

            if attempt >= max_retries || breaker.state() == CircuitState::Open {
                return result;
            }
            attempt += 1;
            let delay = backoff.next_backoff();
            warn!(
                "[{}] {} {} failed; retry {}/{} in {:?}",
                context.request_id,
                request.method,
                request.path,
                attempt,
                max_retries,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, context: &RequestContext, outcome: &Result<ApiResponse, ApiError>, started: Instant) {
        let (status, success, error_kind) = match outcome {
            Ok(envelope) => (
                Some(envelope.http_status()),
                envelope.is_success(),
                envelope.error().map(ApiError::kind),
            ),
            Err(err) => (None, false, Some(err.kind())),
        };

        let record = OperationRecord {
            request_id: context.request_id,
            timestamp: Utc::now(),
            method: context.method,
            path: context.descriptor.path(),
            vdom: context.vdom.clone(),
            status,
            success,
            error_kind,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        let mut operations = self.lock_operations();
        if operations.len() == OPERATION_LOG_CAPACITY {
            operations.pop_front();
        }
        operations.push_back(record);
    }
}

/// Report an unknown top-level field under the argument name the caller used
fn with_caller_name(err: ApiError, args: &Map<String, Value>, descriptor: &EndpointDescriptor) -> ApiError {
    match err {
        ApiError::UnknownField { field, endpoint } => {
            let field = args
                .keys()
                .find(|name| wire_name(name, Some(descriptor.metadata())) == field)
                .cloned()
                .unwrap_or(field);
            ApiError::UnknownField { field, endpoint }
        }
        other => other,
    }
}
