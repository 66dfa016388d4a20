//! Client configuration
//!
//! All options are resolved when the client is constructed. Environment
//! variables are only read by [`ClientConfig::from_env`]; nothing in the
//! runtime consults the environment at call time.

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// How failures are delivered to the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Failures are returned as `Err(ApiError)`
    #[default]
    Raise,
    /// Failures are returned as `Ok(Response)` with `is_success() == false`
    Return,
}

/// Shape in which responses are handed back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Unmodified body text plus status code
    Raw,
    /// Parsed JSON with key access
    #[default]
    Dict,
    /// Attribute-style access over the parsed results
    Object,
}

/// FortiOS client configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Appliance host name or address; may carry an explicit `http://`/`https://` scheme
    pub host: String,
    pub port: Option<u16>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Default VDOM for every call
    pub vdom: Option<String>,
    /// Verify the appliance TLS certificate
    pub verify: bool,
    pub error_mode: ErrorMode,
    pub response_mode: ResponseMode,
    /// Consecutive failures before the breaker opens
    pub circuit_breaker_threshold: u32,
    /// Cool-down in seconds before a half-open probe is allowed
    pub circuit_breaker_timeout: f64,
    /// Per-request timeout in seconds
    pub timeout: f64,
    /// Extra attempts for transport errors and 5xx responses
    pub max_retries: u32,
    /// Block POST/PUT/DELETE
    pub read_only: bool,
    /// Reject fields the endpoint metadata does not declare
    pub strict_validation: bool,
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            token: None,
            username: None,
            password: None,
            vdom: None,
            verify: true,
            error_mode: ErrorMode::default(),
            response_mode: ResponseMode::default(),
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: 60.0,
            timeout: 30.0,
            max_retries: 0,
            read_only: false,
            strict_validation: true,
            user_agent: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token", &redact(&self.token))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("vdom", &self.vdom)
            .field("verify", &self.verify)
            .field("error_mode", &self.error_mode)
            .field("response_mode", &self.response_mode)
            .field("circuit_breaker_threshold", &self.circuit_breaker_threshold)
            .field("circuit_breaker_timeout", &self.circuit_breaker_timeout)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("read_only", &self.read_only)
            .field("strict_validation", &self.strict_validation)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Create a token-authenticated configuration
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Resolve the configuration from `FORTIOS_*` environment variables.
    ///
    /// Recognized: `FORTIOS_HOST` (required), `FORTIOS_PORT`, `FORTIOS_TOKEN`,
    /// `FORTIOS_USERNAME`, `FORTIOS_PASSWORD`, `FORTIOS_VDOM`, `FORTIOS_VERIFY`.
    pub fn from_env() -> Result<Self, ApiError> {
        let host = env::var("FORTIOS_HOST").map_err(|_| {
            ApiError::InvalidConfig("FORTIOS_HOST environment variable is required".to_string())
        })?;

        let port = match env::var("FORTIOS_PORT") {
            Ok(raw) => Some(raw.parse::<u16>().map_err(|e| {
                ApiError::InvalidConfig(format!("FORTIOS_PORT '{}' is not a port: {}", raw, e))
            })?),
            Err(_) => None,
        };

        let verify = match env::var("FORTIOS_VERIFY") {
            Ok(raw) => parse_flag(&raw).ok_or_else(|| {
                ApiError::InvalidConfig(format!("FORTIOS_VERIFY '{}' is not a boolean", raw))
            })?,
            Err(_) => true,
        };

        let config = Self {
            host,
            port,
            token: env::var("FORTIOS_TOKEN").ok(),
            username: env::var("FORTIOS_USERNAME").ok(),
            password: env::var("FORTIOS_PASSWORD").ok(),
            vdom: env::var("FORTIOS_VDOM").ok(),
            verify,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration document
    pub fn from_yaml_str(document: &str) -> Result<Self, ApiError> {
        let config: Self = serde_yaml::from_str(document)
            .map_err(|e| ApiError::InvalidConfig(format!("invalid YAML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Use username/password session login instead of a token
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.token = None;
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_vdom(mut self, vdom: impl Into<String>) -> Self {
        self.vdom = Some(vdom.into());
        self
    }

    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub fn with_error_mode(mut self, error_mode: ErrorMode) -> Self {
        self.error_mode = error_mode;
        self
    }

    #[must_use]
    pub fn with_response_mode(mut self, response_mode: ResponseMode) -> Self {
        self.response_mode = response_mode;
        self
    }

    /// Set breaker threshold and cool-down (seconds)
    #[must_use]
    pub fn with_circuit_breaker(mut self, threshold: u32, timeout_secs: f64) -> Self {
        self.circuit_breaker_threshold = threshold;
        self.circuit_breaker_timeout = timeout_secs;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: f64) -> Self {
        self.timeout = timeout_secs;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    /// Check option combinations
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.host.trim().is_empty() {
            return Err(ApiError::InvalidConfig("host is required".to_string()));
        }

        let has_token = self.token.as_deref().is_some_and(|t| !t.is_empty());
        let has_login = self.username.is_some() || self.password.is_some();
        if has_token && has_login {
            return Err(ApiError::InvalidConfig(
                "token and username/password are mutually exclusive".to_string(),
            ));
        }
        if has_login && (self.username.is_none() || self.password.is_none()) {
            return Err(ApiError::InvalidConfig(
                "username and password must be supplied together".to_string(),
            ));
        }
        if !has_token && !has_login {
            return Err(ApiError::InvalidConfig(
                "either token or username/password is required".to_string(),
            ));
        }

        if self.circuit_breaker_threshold == 0 {
            return Err(ApiError::InvalidConfig(
                "circuit_breaker_threshold must be at least 1".to_string(),
            ));
        }
        check_seconds("circuit_breaker_timeout", self.circuit_breaker_timeout)?;
        check_seconds("timeout", self.timeout)?;
        if self.timeout == 0.0 {
            return Err(ApiError::InvalidConfig("timeout must be positive".to_string()));
        }

        Ok(())
    }

    /// Base URL of the appliance (`https://host[:port]`)
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let (scheme, host) = match host.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("https", host),
        };
        match self.port {
            Some(port) if !is_default_port(scheme, port) => format!("{}://{}:{}", scheme, host, port),
            _ => format!("{}://{}", scheme, host),
        }
    }

    /// Breaker settings derived from this configuration
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_threshold,
            open_timeout: seconds(self.circuit_breaker_timeout),
        }
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        seconds(self.timeout)
    }
}

/// Seconds as a `Duration`, saturating instead of panicking on unvalidated input
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn check_seconds(name: &str, value: f64) -> Result<(), ApiError> {
    if !value.is_finite() || value < 0.0 || Duration::try_from_secs_f64(value).is_err() {
        return Err(ApiError::InvalidConfig(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )));
    }
    Ok(())
}

fn is_default_port(scheme: &str, port: u16) -> bool {
    matches!((scheme, port), ("https", 443) | ("http", 80))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_raise_dict_and_verify() {
        let config = ClientConfig::new("fw.example.net", "secret");

        assert_eq!(config.error_mode, ErrorMode::Raise);
        assert_eq!(config.response_mode, ResponseMode::Dict);
        assert!(config.verify);
        assert!(config.strict_validation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn base_url_omits_default_port() {
        assert_eq!(ClientConfig::new("fw", "t").base_url(), "https://fw");
        assert_eq!(ClientConfig::new("fw", "t").with_port(443).base_url(), "https://fw");
        assert_eq!(ClientConfig::new("fw", "t").with_port(8443).base_url(), "https://fw:8443");
        assert_eq!(
            ClientConfig::new("http://127.0.0.1/", "t").with_port(8080).base_url(),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn rejects_token_and_password_together() {
        let mut config = ClientConfig::new("fw", "token");
        config.username = Some("admin".to_string());
        config.password = Some("pw".to_string());

        let err = config.validate().expect_err("must fail");
        assert!(matches!(err, ApiError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_missing_credentials() {
        let config = ClientConfig {
            host: "fw".to_string(),
            ..ClientConfig::default()
        };

        assert!(config.validate().is_err());
        assert!(config.clone().with_credentials("admin", "pw").validate().is_ok());
    }

    #[test]
    fn rejects_zero_threshold_and_negative_timeouts() {
        let config = ClientConfig::new("fw", "t").with_circuit_breaker(0, 10.0);
        assert!(config.validate().is_err());

        let config = ClientConfig::new("fw", "t").with_circuit_breaker(3, -1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_durations_too_large_to_represent() {
        let breaker = ClientConfig::new("fw", "t").with_circuit_breaker(2, 1e20);
        let request = ClientConfig::new("fw", "t").with_timeout(1e20);

        assert!(matches!(breaker.validate(), Err(ApiError::InvalidConfig(msg)) if msg.contains("circuit_breaker_timeout")));
        assert!(matches!(request.validate(), Err(ApiError::InvalidConfig(msg)) if msg.contains("timeout")));
        assert_eq!(breaker.circuit_breaker().open_timeout, Duration::MAX);
        assert_eq!(request.request_timeout(), Duration::MAX);
    }

    #[test]
    fn parses_yaml_document() {
        let yaml = r#"
host: 10.0.0.1
port: 8443
token: abc
vdom: root
verify: false
error_mode: return
response_mode: object
circuit_breaker_threshold: 2
circuit_breaker_timeout: 0.5
"#;
        let config = ClientConfig::from_yaml_str(yaml).expect("config should parse");

        assert_eq!(config.error_mode, ErrorMode::Return);
        assert_eq!(config.response_mode, ResponseMode::Object);
        assert_eq!(config.vdom.as_deref(), Some("root"));
        assert!(!config.verify);
        assert_eq!(config.circuit_breaker().failure_threshold, 2);
        assert_eq!(config.circuit_breaker().open_timeout, Duration::from_millis(500));
        assert_eq!(config.base_url(), "https://10.0.0.1:8443");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = ClientConfig::new("fw", "super-secret-token");
        let rendered = format!("{:?}", config);

        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn parses_boolean_flags() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
