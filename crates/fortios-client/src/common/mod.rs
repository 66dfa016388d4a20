//! Common utilities for the FortiOS API client
//!
//! Provides the direct HTTP transport shared by every endpoint.

pub mod query;

use crate::config::ClientConfig;
use crate::error::{ApiError, TransportErrorKind};
use crate::transport::{ApiRequest, RawResponse, Transport};
use fortios_schema::Method;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// How requests are authenticated
enum Auth {
    /// REST API admin token sent as a bearer header
    Token(String),
    /// Interactive admin login; the CSRF token is captured at login
    Session {
        username: String,
        password: String,
        csrf_token: RwLock<Option<String>>,
    },
}

/// HTTP transport talking to the appliance directly
pub struct HttpTransport {
    client: Client,
    base_url: String,
    auth: Auth,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match self.auth {
            Auth::Token(_) => "token",
            Auth::Session { .. } => "session",
        };
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("auth", &auth)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Create a transport from a validated configuration
    ///
    /// # Arguments
    /// * `config` - Client configuration (host, port, credentials, TLS and timeout settings)
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        config.validate()?;

        let mut builder = Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.verify)
            .cookie_store(true);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| classify(&config.host, &e))?;

        let auth = match (&config.token, &config.username, &config.password) {
            (Some(token), _, _) => Auth::Token(token.clone()),
            (None, Some(username), Some(password)) => Auth::Session {
                username: username.clone(),
                password: password.clone(),
                csrf_token: RwLock::new(None),
            },
            _ => {
                return Err(ApiError::InvalidConfig(
                    "either token or username/password is required".to_string(),
                ));
            }
        };

        Ok(Self {
            client,
            base_url: config.base_url(),
            auth,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from an API path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Open an admin session (username/password configurations only).
    ///
    /// Called automatically before the first request of a session transport.
    /// Token-authenticated transports need no login; calling this on them is a no-op.
    pub async fn login(&self) -> Result<(), ApiError> {
        let Auth::Session {
            username,
            password,
            csrf_token,
        } = &self.auth
        else {
            return Ok(());
        };

        let url = self.build_url("/logincheck");
        debug!("Opening admin session at {}", url);

        let form = query::build_query_string(&[("username", username.as_str()), ("secretkey", password.as_str())]);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .map_err(|e| classify(&self.base_url, &e))?;

        let status = response.status();
        let token = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(csrf_from_cookie);

        if !status.is_success() || token.is_none() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                path: "/logincheck".to_string(),
                status: status.as_u16(),
                code: None,
                message: format!("login failed: {}", body.trim()),
            });
        }

        *csrf_token.write().await = token;
        debug!("Admin session established");
        Ok(())
    }

    /// Close the admin session, if one is open
    pub async fn logout(&self) -> Result<(), ApiError> {
        let Auth::Session { csrf_token, .. } = &self.auth else {
            return Ok(());
        };
        if csrf_token.read().await.is_none() {
            return Ok(());
        }

        let url = self.build_url("/logout");
        self.client
            .post(&url)
            .send()
            .await
            .map_err(|e| classify(&self.base_url, &e))?;
        *csrf_token.write().await = None;
        debug!("Admin session closed");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    fn identity(&self) -> String {
        self.base_url
            .split_once("://")
            .map_or(self.base_url.as_str(), |(_, host)| host)
            .to_string()
    }

    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        if let Auth::Session { csrf_token, .. } = &self.auth {
            let logged_in = csrf_token.read().await.is_some();
            if !logged_in {
                self.login().await?;
            }
        }

        let url = self.build_url(&query::with_query(&request.path, &request.wire_query()));
        debug!("[{}] {} {}", request.request_id, request.method, url);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        }
        .header("Accept", "application/json")
        .timeout(request.timeout);

        match &self.auth {
            Auth::Token(token) => {
                builder = builder.header("Authorization", format!("Bearer {}", token));
            }
            Auth::Session { csrf_token, .. } => {
                if let Some(csrf) = csrf_token.read().await.as_deref() {
                    builder = builder.header("X-CSRFTOKEN", csrf);
                }
            }
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!("[{}] {} {} failed: {}", request.request_id, request.method, request.path, e);
            classify(&self.identity(), &e)
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify(&self.identity(), &e))?;

        debug!("[{}] HTTP {} ({} bytes)", request.request_id, status, body.len());
        Ok(RawResponse { status, body })
    }
}

/// Map a reqwest failure onto the transport taxonomy
fn classify(target: &str, error: &reqwest::Error) -> ApiError {
    let message = error.to_string();
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if is_tls_failure(error) {
        TransportErrorKind::Tls
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Protocol
    };
    ApiError::Transport {
        target: target.to_string(),
        kind,
        message,
    }
}

fn is_tls_failure(error: &reqwest::Error) -> bool {
    let mut source: Option<&dyn std::error::Error> = Some(error);
    while let Some(err) = source {
        let text = err.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("handshake") {
            return true;
        }
        source = err.source();
    }
    false
}

/// Extract the CSRF token from a `Set-Cookie` header value
fn csrf_from_cookie(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    if name.starts_with("ccsrftoken") {
        let value = value.trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_csrf_token_from_cookie() {
        assert_eq!(
            csrf_from_cookie("ccsrftoken=\"A1B2C3\"; path=/; secure"),
            Some("A1B2C3".to_string())
        );
        assert_eq!(
            csrf_from_cookie("ccsrftoken_443_abc=\"XYZ\"; path=/"),
            Some("XYZ".to_string())
        );
        assert_eq!(csrf_from_cookie("APSCOOKIE_1=abc; path=/"), None);
        assert_eq!(csrf_from_cookie("ccsrftoken=\"\"; path=/"), None);
    }

    #[test]
    fn identity_strips_scheme() {
        let config = ClientConfig::new("fw.example.net", "token").with_port(8443);
        let transport = HttpTransport::new(&config).expect("transport should build");

        assert_eq!(transport.identity(), "fw.example.net:8443");
        assert_eq!(
            transport.build_url("/api/v2/monitor/system/status"),
            "https://fw.example.net:8443/api/v2/monitor/system/status"
        );
    }

    #[test]
    fn debug_output_hides_credentials() {
        let config = ClientConfig::new("fw", "secret-token");
        let transport = HttpTransport::new(&config).expect("transport should build");

        assert!(!format!("{:?}", transport).contains("secret-token"));
    }
}
