//! Test doubles shared by the client test suites.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tripsync_core::RequestSpec;

use crate::transport::{ApiResponse, Transport, TransportError};

/// Scripted transport: answers with queued responses in order, then with
/// `200 {}` once the script runs out. Every request is recorded.
#[derive(Default)]
pub(crate) struct FakeTransport {
    script: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    calls: Mutex<Vec<RequestSpec>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub(crate) fn push_ok(&self, status: u16, body: &str) {
        self.script.lock().unwrap().push_back(Ok(ApiResponse::new(status, body.to_string())));
    }

    pub(crate) fn push_status(&self, status: u16) {
        self.push_err(TransportError::Status { status, body: format!("{{\"status\":{status}}}") });
    }

    pub(crate) fn push_err(&self, err: TransportError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub(crate) fn calls(&self) -> Vec<RequestSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.url).collect()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &RequestSpec) -> Result<ApiResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response.unwrap_or_else(|| Ok(ApiResponse::new(200, "{}")))
    }
}
