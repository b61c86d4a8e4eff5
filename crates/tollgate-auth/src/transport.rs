//! Transport layer: sends one request and buffers its response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use url::Url;

use crate::error::{Error, Result, TransportError};
use crate::request::{ApiRequest, ApiResponse};

/// Default timeout for requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends requests to the API.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response, whatever its status.
    async fn send(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, TransportError>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying HTTP client, shared with the credential issuer.
    pub fn client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> std::result::Result<Url, TransportError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
        let url = self.url(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(request.headers.as_map().clone())
            .timeout(self.timeout);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        tracing::trace!(method = %request.method, path = %request.route(), status = status.as_u16(), "Transport response");
        Ok(ApiResponse::from_parts(status, headers, body))
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    base_url: Option<String>,
    timeout: Duration,
}

impl HttpTransportBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the API origin.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpTransport> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;

        let mut base_url = Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("Invalid base_url '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("tollgate-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpTransport {
            http,
            base_url,
            timeout: self.timeout,
        })
    }
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        assert!(HttpTransport::builder().build().is_err());
    }

    #[test]
    fn test_builder_normalizes_trailing_slash() {
        let transport = HttpTransport::builder()
            .base_url("http://localhost:8080")
            .build()
            .unwrap();
        assert_eq!(transport.base_url().as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_url_building() {
        let transport = HttpTransport::builder()
            .base_url("http://localhost:8080/app")
            .build()
            .unwrap();

        let url = transport.url("/api/brands/42?lang=en").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/app/api/brands/42?lang=en");

        let url = transport.url("api/profile").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/app/api/profile");
    }
}
