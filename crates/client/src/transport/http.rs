//! HTTP transport backed by reqwest.
//!
//! ### Request shaping
//! - Relative paths are resolved against the configured API base URL
//! - `Content-Type` and `Accept` default to `application/json`
//! - Caller headers win over defaults
//!
//! ### Failure mapping
//! - Connect/DNS/IO errors -> `TransportError::Network`
//! - Timeouts -> `TransportError::Timeout`
//! - Non-2xx statuses -> `TransportError::Status` with the body text

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tripsync_core::{Method, RequestSpec, SyncConfig};
use url::Url;

use super::{ApiResponse, Transport, TransportError};

const JSON: &str = "application/json";

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// API base URL, e.g. `https://tripwise-api.onrender.com/api`
    pub base_url: Url,
    /// User agent string (default: "tripsync/0.1")
    pub user_agent: String,
    /// Request timeout (default: 20s)
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn from_sync_config(config: &SyncConfig) -> Result<Self, tripsync_core::Error> {
        Ok(Self { base_url: config.base_url()?, user_agent: config.user_agent.clone(), timeout: config.timeout() })
    }
}

/// reqwest-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Resolve a request path against the base URL. Absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> Result<Url, TransportError> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.config.base_url.as_str().trim_end_matches('/'), path.trim_start_matches('/'))
        };
        Url::parse(&raw).map_err(|e| TransportError::InvalidRequest(format!("{raw}: {e}")))
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn headers(request: &RequestSpec) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON));
        headers.insert(header::ACCEPT, HeaderValue::from_static(JSON));

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn api_origin(&self) -> Option<String> {
        Some(self.config.base_url.origin().ascii_serialization())
    }

    async fn send(&self, request: &RequestSpec) -> Result<ApiResponse, TransportError> {
        let start = Instant::now();
        let url = self.resolve(&request.url)?;

        let mut builder = self
            .http
            .request(reqwest_method(request.method), url.clone())
            .headers(Self::headers(request)?);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();

        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await?;

        tracing::debug!(
            method = %request.method,
            url = %url,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "request completed"
        );

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(ApiResponse { status: status.as_u16(), headers, body })
    }
}
