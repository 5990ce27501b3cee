//! Connectivity signal sources for the CLI.
//!
//! A terminal has no platform "online" event, so watch mode polls a TCP
//! connect to the API host and feeds the result to the monitor.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tripsync_client::{ApiResponse, Transport, TransportError};
use tripsync_core::RequestSpec;
use url::Url;

/// Transport used with `--offline`: every request fails as unreachable.
pub struct OfflineTransport;

#[async_trait]
impl Transport for OfflineTransport {
    async fn send(&self, request: &RequestSpec) -> Result<ApiResponse, TransportError> {
        tracing::debug!(method = %request.method, url = %request.url, "offline mode; request not sent");
        Err(TransportError::Network("offline mode".into()))
    }
}

/// Whether a TCP connection to the host of `url` opens within `timeout`.
pub async fn reachable(url: &Url, timeout: Duration) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let port = url.port_or_known_default().unwrap_or(443);
    matches!(tokio::time::timeout(timeout, TcpStream::connect((host, port))).await, Ok(Ok(_)))
}
