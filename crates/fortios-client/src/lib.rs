//! FortiOS REST API Client
//!
//! A schema-driven client runtime for the FortiOS REST API. Endpoints are not
//! hand-written: they are loaded from the generator's catalog and served by
//! one generic engine.
//!
//! # Example
//!
//! ```no_run
//! use fortios_client::{CallOptions, ClientConfig, FortiOSClient, ResponseAccess};
//! use fortios_schema::Catalog;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::from_path("schema/fortios-7.4.yaml")?;
//! let client = FortiOSClient::new(ClientConfig::from_env()?, &catalog)?;
//!
//! // Read one address
//! let address = client.api().cmdb().child("firewall").endpoint("address")?;
//! let web = address.get(CallOptions::new().mkey("web01")).await?;
//! println!("{:?}", web.get_results()?);
//!
//! // Create one
//! let args = json!({"name": "web02", "subnet": "10.0.0.2/32", "allow_routing": true});
//! let created = address
//!     .post(args.as_object().cloned().unwrap_or_default(), CallOptions::new())
//!     .await?;
//! println!("created {}", created.get_mkey()?);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Dispatch**: endpoint tree built once from the catalog; unknown paths and
//!   disallowed verbs fail before any I/O
//! - **Payloads**: keyword arguments normalized into wire format and validated
//!   against the endpoint's field table
//! - **Circuit breaking**: per-target breaker with a single half-open probe
//! - **Response modes**: raw, dict or attribute-object results
//! - **Proxying**: reach managed devices through a FortiManager

pub mod backoff;
pub mod circuit_breaker;
pub mod client;
pub mod common;
pub mod config;
pub mod dispatch;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod payload;
pub mod proxy;
pub mod response;
pub mod transport;
pub mod validation;

pub use circuit_breaker::{CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use client::{FortiOSClient, OperationRecord, RequestContext};
pub use common::HttpTransport;
pub use config::{ClientConfig, ErrorMode, ResponseMode};
pub use dispatch::{Api, CallOptions, Endpoint, EndpointDescriptor, EndpointRegistry, Namespace};
pub use error::{ApiError, ErrorKind, TransportErrorKind};
pub use payload::BuildMode;
pub use proxy::ProxyTransport;
pub use response::{ApiResponse, Cardinality, FortiObject, ObjectResponse, RawResult, Response, ResponseAccess, Results};
pub use transport::{ApiRequest, RawResponse, Transport};
pub use validation::ValidationOptions;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockTransport;
