//! Connectivity-aware request dispatch.
//!
//! Every request is attempted against the network first. Successful reads
//! refresh the cache mirror. Failures are classified and routed:
//!
//! | class        | mutation                  | read                          |
//! |--------------|---------------------------|-------------------------------|
//! | connectivity | queue, synthetic success  | cache fallback or "no data"   |
//! | auth         | clear credentials, error  | clear credentials, error      |
//! | other        | error                     | cache fallback, else error    |
//!
//! Results carry their provenance so a cache fallback can never be mistaken
//! for a fresh network response.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tripsync_core::{CacheEntry, CacheMirror, CredentialStore, Error, Method, QueueEntry, RequestSpec, WriteQueue};
use url::Url;

use crate::classify::{FailureClass, classify};
use crate::connectivity::ConnectivityMonitor;
use crate::status::StatusBoard;
use crate::transport::{ApiResponse, Transport, TransportError};

const AUTHORIZATION: &str = "Authorization";

/// Where a dispatch result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Network,
    Queued,
    CacheFallback,
    NoCachedData,
}

/// Result of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The backend answered with a success status.
    Network(ApiResponse),
    /// The mutation was deferred to the write queue.
    Queued { pending: usize, message: String },
    /// The read failed and a cached copy was returned instead.
    CacheFallback { key: String, entry: CacheEntry, offline: bool },
    /// The read failed and nothing was cached under `key`.
    NoCachedData { key: String, offline: bool },
}

impl DispatchOutcome {
    pub fn provenance(&self) -> Provenance {
        match self {
            DispatchOutcome::Network(_) => Provenance::Network,
            DispatchOutcome::Queued { .. } => Provenance::Queued,
            DispatchOutcome::CacheFallback { .. } => Provenance::CacheFallback,
            DispatchOutcome::NoCachedData { .. } => Provenance::NoCachedData,
        }
    }

    pub fn is_offline(&self) -> bool {
        match self {
            DispatchOutcome::Network(_) => false,
            DispatchOutcome::Queued { .. } => true,
            DispatchOutcome::CacheFallback { offline, .. } | DispatchOutcome::NoCachedData { offline, .. } => *offline,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, DispatchOutcome::Queued { .. })
    }

    /// Payload as JSON: the decoded network body or the cached data.
    ///
    /// `None` for queued mutations, missing cache entries and network bodies
    /// that are not JSON.
    pub fn data(&self) -> Option<Value> {
        match self {
            DispatchOutcome::Network(response) => response.json().ok(),
            DispatchOutcome::CacheFallback { entry, .. } => Some(entry.data.clone()),
            DispatchOutcome::Queued { .. } | DispatchOutcome::NoCachedData { .. } => None,
        }
    }

    /// Body handed to optimistic-UI callers for a queued mutation.
    pub fn synthetic_body(&self) -> Option<Value> {
        match self {
            DispatchOutcome::Queued { message, .. } => Some(json!({"offline": true, "queued": true, "message": message})),
            _ => None,
        }
    }

    /// Tagged JSON view of the outcome for logs and tooling.
    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "provenance": self.provenance(),
            "offline": self.is_offline(),
            "queued": self.is_queued(),
            "data": self.data(),
        });
        match self {
            DispatchOutcome::Network(response) => out["status"] = json!(response.status),
            DispatchOutcome::Queued { pending, message } => {
                out["pending"] = json!(pending);
                out["message"] = json!(message);
            }
            DispatchOutcome::CacheFallback { key, entry, .. } => {
                out["key"] = json!(key);
                out["cachedAt"] = json!(entry.cached_at);
            }
            DispatchOutcome::NoCachedData { key, .. } => out["key"] = json!(key),
        }
        out
    }
}

/// Message shown for a mutation saved locally.
pub fn offline_message(method: Method) -> &'static str {
    match method {
        Method::Post => "Created locally. Will sync when you're back online.",
        Method::Put | Method::Patch => "Updated locally. Will sync when you're back online.",
        Method::Delete => "Deleted locally. Will sync when you're back online.",
        Method::Get => "Saved locally. Will sync when you're back online.",
    }
}

/// Whether `url` targets the API: relative paths always do, absolute URLs
/// only when their origin equals `api_origin`.
fn targets_api(url: &str, api_origin: Option<&str>) -> bool {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return true;
    }
    match (Url::parse(url), api_origin) {
        (Ok(parsed), Some(origin)) => parsed.origin().ascii_serialization() == origin,
        _ => false,
    }
}

/// Copy of `spec` carrying the stored bearer token, if any.
///
/// The token is only ever added to the wire copy; queued entries keep the
/// caller's headers so a rotated token is picked up on replay. Requests to
/// another origin go out without it.
pub(crate) async fn authorize(
    spec: &RequestSpec, credentials: &CredentialStore, api_origin: Option<&str>,
) -> Result<RequestSpec, Error> {
    let mut wire = spec.clone();
    if wire.headers.keys().any(|name| name.eq_ignore_ascii_case(AUTHORIZATION)) {
        return Ok(wire);
    }
    if !targets_api(&wire.url, api_origin) {
        tracing::debug!(url = %wire.url, "foreign origin; credentials not attached");
        return Ok(wire);
    }
    if let Some(token) = credentials.token().await? {
        wire.headers.insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
    }
    Ok(wire)
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    monitor: ConnectivityMonitor,
    cache: CacheMirror,
    queue: WriteQueue,
    credentials: CredentialStore,
    status: StatusBoard,
}

impl Dispatcher {
    pub(crate) fn new(
        transport: Arc<dyn Transport>, monitor: ConnectivityMonitor, cache: CacheMirror, queue: WriteQueue,
        credentials: CredentialStore, status: StatusBoard,
    ) -> Self {
        Self { transport, monitor, cache, queue, credentials, status }
    }

    /// Issue `spec` and route any failure.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRequest` if the spec is malformed (nothing is sent)
    /// - `Error::AuthFailed` if credentials were rejected while online
    /// - `Error::Http`/`Error::Network` for other online failures with no cache to fall back on
    /// - `Error::StorageUnavailable` if the queue or cache could not be written
    pub async fn dispatch(&self, spec: RequestSpec) -> Result<DispatchOutcome, Error> {
        spec.validate()?;
        let wire = authorize(&spec, &self.credentials, self.transport.api_origin().as_deref()).await?;

        match self.transport.send(&wire).await {
            Ok(response) => {
                if !spec.is_mutation() {
                    self.mirror(&spec, &response).await?;
                }
                Ok(DispatchOutcome::Network(response))
            }
            Err(err) => self.recover(&spec, err).await,
        }
    }

    async fn mirror(&self, spec: &RequestSpec, response: &ApiResponse) -> Result<(), Error> {
        let key = spec.effective_cache_key();
        if tripsync_core::is_reserved_key(&key) {
            tracing::debug!(key, "cache key is reserved; not cached");
            return Ok(());
        }
        match response.json() {
            Ok(data) => {
                self.cache.write(&key, data).await?;
            }
            Err(e) => tracing::debug!(key, error = %e, "response is not JSON; not cached"),
        }
        Ok(())
    }

    async fn recover(&self, spec: &RequestSpec, err: TransportError) -> Result<DispatchOutcome, Error> {
        let online = self.monitor.is_online();
        let class = classify(&err, online);
        tracing::debug!(method = %spec.method, url = %spec.url, class = %class, error = %err, "request failed");

        match class {
            FailureClass::Connectivity if spec.is_mutation() => {
                let pending = self.queue.enqueue(QueueEntry::from_request(spec)).await?;
                self.status.set_pending(pending);
                Ok(DispatchOutcome::Queued { pending, message: offline_message(spec.method).to_string() })
            }
            FailureClass::Connectivity => self.fallback(spec.effective_cache_key(), true).await,
            FailureClass::Auth => {
                self.credentials.clear().await?;
                let (status, message) = match err {
                    TransportError::Status { status, body } => (status, body),
                    other => (401, other.to_string()),
                };
                tracing::warn!(url = %spec.url, status, "credentials rejected");
                Err(Error::AuthFailed { status, message })
            }
            FailureClass::Other if !spec.is_mutation() => {
                match self.fallback(spec.effective_cache_key(), false).await? {
                    DispatchOutcome::NoCachedData { .. } => Err(err.into()),
                    outcome => Ok(outcome),
                }
            }
            FailureClass::Other => Err(err.into()),
        }
    }

    async fn fallback(&self, key: String, offline: bool) -> Result<DispatchOutcome, Error> {
        match self.cache.read(&key).await? {
            Some(entry) => {
                tracing::info!(key, offline, "serving cached data");
                Ok(DispatchOutcome::CacheFallback { key, entry, offline })
            }
            None => Ok(DispatchOutcome::NoCachedData { key, offline }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::SyncStatus;
    use crate::testing::FakeTransport;
    use tripsync_core::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        transport: Arc<FakeTransport>,
        monitor: ConnectivityMonitor,
        status: StatusBoard,
        dispatcher: Dispatcher,
    }

    impl Harness {
        fn new(online: bool) -> Self {
            let store = Arc::new(MemoryStore::new());
            let transport = Arc::new(FakeTransport::new());
            let monitor = ConnectivityMonitor::new(online);
            let status = StatusBoard::new(SyncStatus { online, ..Default::default() });
            let dispatcher = Dispatcher::new(
                transport.clone(),
                monitor.clone(),
                CacheMirror::new(store.clone()),
                WriteQueue::new(store.clone()),
                CredentialStore::new(store.clone()),
                status.clone(),
            );
            Self { store, transport, monitor, status, dispatcher }
        }

        fn cache(&self) -> CacheMirror {
            CacheMirror::new(self.store.clone())
        }

        fn queue(&self) -> WriteQueue {
            WriteQueue::new(self.store.clone())
        }

        fn credentials(&self) -> CredentialStore {
            CredentialStore::new(self.store.clone())
        }

        fn unreachable(&self) {
            self.transport.push_err(TransportError::Network("connection refused".into()));
        }
    }

    fn alps() -> RequestSpec {
        RequestSpec::post("/trips").with_json(&json!({"name": "Alps"})).unwrap()
    }

    #[tokio::test]
    async fn test_successful_read_refreshes_cache() {
        let h = Harness::new(true);
        h.transport.push_ok(200, r#"[{"id":1}]"#);

        let outcome = h.dispatcher.dispatch(RequestSpec::get("/trips").with_cache_key("cached-trips")).await.unwrap();
        assert_eq!(outcome.provenance(), Provenance::Network);
        assert!(!outcome.is_offline());

        let entry = h.cache().read("cached-trips").await.unwrap().unwrap();
        assert_eq!(entry.data, json!([{"id": 1}]));
    }

    #[tokio::test]
    async fn test_read_without_key_uses_derived_key() {
        let h = Harness::new(true);
        h.transport.push_ok(200, r#"{"total":3}"#);

        h.dispatcher.dispatch(RequestSpec::get("/trips/7/summary")).await.unwrap();
        assert!(h.cache().read("trips-7-summary").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_non_json_read_is_not_cached() {
        let h = Harness::new(true);
        h.transport.push_ok(200, "<html>");

        let outcome = h.dispatcher.dispatch(RequestSpec::get("/trips")).await.unwrap();
        assert_eq!(outcome.provenance(), Provenance::Network);
        assert!(h.cache().keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_mutation_does_not_touch_cache() {
        let h = Harness::new(true);
        h.transport.push_ok(201, r#"{"id":9}"#);

        let outcome = h.dispatcher.dispatch(alps()).await.unwrap();
        assert_eq!(outcome.data(), Some(json!({"id": 9})));
        assert!(h.cache().keys().await.unwrap().is_empty());
        assert!(h.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_mutation_is_queued() {
        let h = Harness::new(false);
        h.unreachable();

        let outcome = h.dispatcher.dispatch(alps()).await.unwrap();
        assert!(outcome.is_queued());
        assert!(outcome.is_offline());
        assert_eq!(
            outcome.synthetic_body().unwrap(),
            json!({"offline": true, "queued": true, "message": "Created locally. Will sync when you're back online."})
        );

        let entries = h.queue().list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "/trips");
        assert_eq!(entries[0].method, Method::Post);
        assert_eq!(h.status.current().pending_count, 1);
    }

    #[tokio::test]
    async fn test_repeated_offline_mutation_is_not_deduplicated() {
        let h = Harness::new(false);
        h.unreachable();
        h.unreachable();

        h.dispatcher.dispatch(alps()).await.unwrap();
        let outcome = h.dispatcher.dispatch(alps()).await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Queued { pending: 2, .. }));
        let entries = h.queue().list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].body, entries[1].body);
    }

    #[tokio::test]
    async fn test_token_is_sent_but_not_queued() {
        let h = Harness::new(false);
        h.credentials().save("secret", None).await.unwrap();
        h.unreachable();

        h.dispatcher.dispatch(alps()).await.unwrap();

        let sent = &h.transport.calls()[0];
        assert_eq!(sent.headers.get("Authorization").unwrap(), "Bearer secret");
        let queued = h.queue().peek_head().await.unwrap().unwrap();
        assert!(!queued.headers.contains_key("Authorization"));
    }

    #[tokio::test]
    async fn test_offline_read_falls_back_to_cache() {
        let h = Harness::new(false);
        h.cache().write("categories", json!([{"id": 1, "name": "Food"}])).await.unwrap();
        h.unreachable();

        let outcome = h.dispatcher.dispatch(RequestSpec::get("/categories").with_cache_key("categories")).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::CacheFallback { offline: true, .. }));
        assert_eq!(outcome.data(), Some(json!([{"id": 1, "name": "Food"}])));
        assert!(h.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_read_without_cache_is_explicit() {
        let h = Harness::new(false);
        h.unreachable();

        let outcome = h.dispatcher.dispatch(RequestSpec::get("/trips/4/itineraries").with_cache_key("itineraries-4")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::NoCachedData { key: "itineraries-4".into(), offline: true });
        assert_eq!(outcome.data(), None);
    }

    #[tokio::test]
    async fn test_offline_unauthorized_is_not_auth_failure() {
        let h = Harness::new(false);
        h.credentials().save("token", Some(json!({"name": "sam"}))).await.unwrap();
        h.transport.push_status(401);

        let outcome = h.dispatcher.dispatch(alps()).await.unwrap();
        assert!(outcome.is_queued());
        assert_eq!(h.credentials().token().await.unwrap().as_deref(), Some("token"));
    }

    #[tokio::test]
    async fn test_online_unauthorized_clears_credentials() {
        let h = Harness::new(true);
        h.credentials().save("expired", Some(json!({"name": "sam"}))).await.unwrap();
        h.transport.push_status(401);

        let err = h.dispatcher.dispatch(RequestSpec::get("/trips")).await.unwrap_err();
        assert!(matches!(err, Error::AuthFailed { status: 401, .. }));
        assert!(!h.credentials().is_authenticated().await.unwrap());
        assert_eq!(h.credentials().user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_online_server_error_falls_back_to_cache() {
        let h = Harness::new(true);
        h.cache().write("categories", json!([{"id": 1, "name": "Food"}])).await.unwrap();
        h.transport.push_status(500);

        let outcome = h.dispatcher.dispatch(RequestSpec::get("/categories").with_cache_key("categories")).await.unwrap();
        assert_eq!(outcome.provenance(), Provenance::CacheFallback);
        assert!(!outcome.is_offline());
        assert_eq!(outcome.data(), Some(json!([{"id": 1, "name": "Food"}])));
    }

    #[tokio::test]
    async fn test_online_server_error_without_cache_propagates() {
        let h = Harness::new(true);
        h.transport.push_status(500);

        let err = h.dispatcher.dispatch(RequestSpec::get("/categories")).await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_online_mutation_failure_propagates() {
        let h = Harness::new(true);
        h.transport.push_status(422);

        let err = h.dispatcher.dispatch(alps()).await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 422, .. }));
        assert!(h.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_fallback_is_distinguishable_from_network() {
        let h = Harness::new(true);
        h.transport.push_ok(200, r#"[{"id":1}]"#);
        let fresh = h.dispatcher.dispatch(RequestSpec::get("/trips")).await.unwrap();

        h.monitor.report(false);
        h.unreachable();
        let cached = h.dispatcher.dispatch(RequestSpec::get("/trips")).await.unwrap();

        assert_eq!(fresh.data(), cached.data());
        assert_ne!(fresh.provenance(), cached.provenance());
        assert_ne!(fresh.to_json()["provenance"], cached.to_json()["provenance"]);
    }

    #[tokio::test]
    async fn test_invalid_spec_is_not_sent() {
        let h = Harness::new(true);
        let err = h.dispatcher.dispatch(RequestSpec::get("")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_on_enqueue_surfaces() {
        let h = Harness::new(false);
        h.credentials().save("secret", None).await.unwrap();
        h.unreachable();
        h.store.set_read_only(true);

        let err = h.dispatcher.dispatch(alps()).await.unwrap_err();
        assert!(err.is_storage());
        assert_eq!(h.transport.calls().len(), 1);
        assert_eq!(h.transport.calls()[0].headers.get("Authorization").unwrap(), "Bearer secret");

        h.store.set_read_only(false);
        assert!(h.queue().is_empty().await.unwrap());
        assert_eq!(h.status.current().pending_count, 0);
    }

    #[tokio::test]
    async fn test_token_stays_on_api_origin() {
        let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
        credentials.save("secret", None).await.unwrap();
        let origin = Some("https://api.example.com");

        let relative = authorize(&RequestSpec::get("/trips"), &credentials, origin).await.unwrap();
        assert_eq!(relative.headers.get("Authorization").unwrap(), "Bearer secret");

        let same = RequestSpec::get("https://api.example.com/api/trips");
        let same = authorize(&same, &credentials, origin).await.unwrap();
        assert_eq!(same.headers.get("Authorization").unwrap(), "Bearer secret");

        let foreign = RequestSpec::get("https://other.example.com/api/trips");
        assert!(authorize(&foreign, &credentials, origin).await.unwrap().headers.is_empty());

        let other_port = RequestSpec::get("https://api.example.com:8443/api/trips");
        assert!(authorize(&other_port, &credentials, origin).await.unwrap().headers.is_empty());

        let unknown = RequestSpec::get("https://api.example.com/api/trips");
        assert!(authorize(&unknown, &credentials, None).await.unwrap().headers.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_origin_dispatch_sends_no_token() {
        let h = Harness::new(true);
        h.credentials().save("secret", None).await.unwrap();
        h.transport.push_ok(200, "[]");

        h.dispatcher.dispatch(RequestSpec::get("https://other.example.com/trips")).await.unwrap();
        assert!(!h.transport.calls()[0].headers.contains_key("Authorization"));
    }

    #[test]
    fn test_offline_messages() {
        assert!(offline_message(Method::Post).starts_with("Created"));
        assert!(offline_message(Method::Put).starts_with("Updated"));
        assert!(offline_message(Method::Patch).starts_with("Updated"));
        assert!(offline_message(Method::Delete).starts_with("Deleted"));
    }
}
