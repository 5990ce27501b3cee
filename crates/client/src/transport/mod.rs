//! Network transport.
//!
//! The dispatcher and replay engine only see [`Transport`]; bodies travel as
//! opaque bytes in both directions. A response outside 2xx is reported as
//! [`TransportError::Status`] so every failure goes through classification.

pub mod error;
pub mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tripsync_core::RequestSpec;

pub use error::TransportError;
pub use http::HttpTransport;

/// A successful response from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, headers: BTreeMap::new(), body: body.into() }
    }

    /// Decode the body as JSON. An empty body decodes as `null`.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
    }
}

/// Something that can put a request on the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestSpec) -> Result<ApiResponse, TransportError>;

    /// Origin of the API this transport talks to, e.g. `https://api.example.com`.
    ///
    /// Credentials are only attached to absolute URLs on this origin. `None`
    /// means absolute URLs never carry credentials.
    fn api_origin(&self) -> Option<String> {
        None
    }
}
