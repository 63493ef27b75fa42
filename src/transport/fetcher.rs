//! HTTP transport implementation
//!
//! This module handles every network request made while harvesting:
//! - Building the HTTP client from the `[http]` configuration
//! - Attaching per-source headers and cookies (`AuthContext`)
//! - Classifying failures into `TransportError`

use crate::config::HttpConfig;
use async_trait::async_trait;
use reqwest::{header, Client};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a transport while fetching a URL
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Rejected content from {url}: {reason}")]
    InvalidPayload { url: String, reason: String },

    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Returns true for failures worth another attempt
    ///
    /// | Condition | Retry |
    /// |-----------|-------|
    /// | HTTP 5xx, HTTP 429 | yes |
    /// | Timeout, connection failure | yes |
    /// | Other HTTP status | no |
    /// | Invalid URL or content | no |
    /// | Cancelled | never |
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::InvalidUrl { .. } | Self::InvalidPayload { .. } | Self::Cancelled => false,
        }
    }

    /// HTTP status code, when the failure is a status response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Per-source request decoration, opaque to the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
}

impl AuthContext {
    pub fn new(headers: BTreeMap<String, String>, cookies: BTreeMap<String, String>) -> Self {
        Self { headers, cookies }
    }

    /// Formats the cookies as a single `Cookie` header value
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Fetches raw bytes for a URL
///
/// The engine only ever talks to this trait; the authentication context is
/// handed through untouched from the adapter.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str, auth: &AuthContext) -> Result<Vec<u8>, TransportError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The `[http]` configuration section
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use toon_leech::config::HttpConfig;
/// use toon_leech::transport::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport from the `[http]` configuration
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str, auth: &AuthContext) -> Result<Vec<u8>, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in &auth.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(cookies) = auth.cookie_header() {
            request = request.header(header::COOKIE, cookies);
        }

        let response = request.send().await.map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| classify_error(url, e))?;
        Ok(body.to_vec())
    }
}

/// Maps a reqwest failure onto the transport taxonomy
fn classify_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_builder() {
        TransportError::InvalidUrl {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else if let Some(status) = error.status() {
        TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        TransportError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&HttpConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_cookie_header_format() {
        let mut cookies = BTreeMap::new();
        cookies.insert("needGDPR".to_string(), "false".to_string());
        cookies.insert("ageGatePass".to_string(), "true".to_string());
        let auth = AuthContext::new(BTreeMap::new(), cookies);

        // BTreeMap keeps the header stable across runs
        assert_eq!(
            auth.cookie_header().as_deref(),
            Some("ageGatePass=true; needGDPR=false")
        );
        assert_eq!(AuthContext::default().cookie_header(), None);
    }

    #[test]
    fn test_retryable_classification() {
        let status = |status| TransportError::Status {
            url: "https://x/".to_string(),
            status,
        };
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!TransportError::Cancelled.is_retryable());
        assert_eq!(status(404).status(), Some(404));
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_a_network_error() {
        let transport = HttpTransport::new(&HttpConfig::default()).unwrap();
        let result = transport.fetch("not a url", &AuthContext::default()).await;
        assert!(matches!(result, Err(TransportError::InvalidUrl { .. })));
    }
}
