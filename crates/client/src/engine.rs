//! The sync engine facade.
//!
//! [`SyncEngine`] is an explicitly constructed handle over one store scope.
//! Several engines can coexist in a process (tests do this constantly); each
//! owns its own queue lock, monitor and status channel.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tripsync_core::cache::{self, CacheEntry};
use tripsync_core::queue::DeadLetter;
use tripsync_core::{
    CacheMirror, CredentialStore, Error, PersistentStore, QueueEntry, RequestSpec, SqliteStore, SyncConfig, WriteQueue,
};

use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::replay::{ReplayEngine, ReplayReport};
use crate::status::{StatusBoard, SyncStatus};
use crate::subscription::Subscription;
use crate::transport::Transport;
use crate::transport::http::{HttpConfig, HttpTransport};

/// Engine tuning that does not concern the store or transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub initially_online: bool,
    /// Zero retries permanently rejected entries forever.
    pub max_replay_attempts: u32,
    pub stale_after_minutes: i64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { initially_online: true, max_replay_attempts: 5, stale_after_minutes: 5 }
    }
}

impl From<&SyncConfig> for EngineOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            initially_online: true,
            max_replay_attempts: config.max_replay_attempts,
            stale_after_minutes: config.stale_after_minutes,
        }
    }
}

/// Pending mutations, for "N changes pending sync".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub pending_count: usize,
    pub entries: Vec<QueueEntry>,
}

#[derive(Clone)]
pub struct SyncEngine {
    cache: CacheMirror,
    queue: WriteQueue,
    credentials: CredentialStore,
    monitor: ConnectivityMonitor,
    status: StatusBoard,
    dispatcher: Dispatcher,
    replay: ReplayEngine,
    options: EngineOptions,
}

impl SyncEngine {
    /// Open the SQLite store and HTTP transport described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unusable base URL, `Error::StorageUnavailable`
    /// if the database cannot be opened, `Error::Network` if the HTTP client
    /// cannot be built.
    pub async fn open(config: &SyncConfig) -> Result<Self, Error> {
        let origin = config.origin()?;
        let store = SqliteStore::open(&config.db_path, origin.clone()).await?;
        let transport = HttpTransport::new(HttpConfig::from_sync_config(config)?)?;

        tracing::info!(origin, db_path = %config.db_path.display(), "sync engine opened");
        Self::new(Arc::new(store), Arc::new(transport), EngineOptions::from(config)).await
    }

    /// Build an engine over an existing store and transport.
    pub async fn new(
        store: Arc<dyn PersistentStore>, transport: Arc<dyn Transport>, options: EngineOptions,
    ) -> Result<Self, Error> {
        let cache = CacheMirror::new(store.clone());
        let queue = WriteQueue::new(store.clone());
        let credentials = CredentialStore::new(store);
        let monitor = ConnectivityMonitor::new(options.initially_online);

        let pending_count = queue.len().await?;
        let status = StatusBoard::new(SyncStatus { online: options.initially_online, was_offline: false, pending_count });

        let dispatcher = Dispatcher::new(
            transport.clone(),
            monitor.clone(),
            cache.clone(),
            queue.clone(),
            credentials.clone(),
            status.clone(),
        );
        let replay = ReplayEngine::new(
            transport,
            queue.clone(),
            credentials.clone(),
            monitor.clone(),
            status.clone(),
            options.max_replay_attempts,
        );

        Ok(Self { cache, queue, credentials, monitor, status, dispatcher, replay, options })
    }

    /// Issue a request through the dispatcher.
    pub async fn dispatch(&self, spec: RequestSpec) -> Result<DispatchOutcome, Error> {
        self.dispatcher.dispatch(spec).await
    }

    pub async fn cache_read(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        self.cache.read(key).await
    }

    pub async fn cache_write(&self, key: &str, data: Value) -> Result<CacheEntry, Error> {
        self.cache.write(key, data).await
    }

    /// Whether `entry` is older than the configured staleness threshold.
    pub fn is_stale(&self, entry: Option<&CacheEntry>) -> bool {
        cache::is_stale(entry, self.options.stale_after_minutes)
    }

    pub async fn cache_keys(&self) -> Result<Vec<String>, Error> {
        self.cache.keys().await
    }

    pub async fn clear_cache(&self) -> Result<usize, Error> {
        self.cache.clear_all().await
    }

    pub async fn queue_status(&self) -> Result<QueueStatus, Error> {
        let entries = self.queue.list().await?;
        Ok(QueueStatus { pending_count: entries.len(), entries })
    }

    /// Drop every pending mutation. Returns how many were discarded.
    pub async fn discard_pending(&self) -> Result<usize, Error> {
        let dropped = self.queue.clear().await?;
        self.status.set_pending(0);
        Ok(dropped)
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, Error> {
        self.queue.dead_letters().await
    }

    pub async fn clear_dead_letters(&self) -> Result<usize, Error> {
        self.queue.clear_dead_letters().await
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.status.current()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.watch()
    }

    /// Call `callback` whenever online state, `was_offline` or the pending
    /// count changes. Dropping the returned handle unsubscribes.
    pub fn on_sync_status_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(SyncStatus) + Send + 'static,
    {
        self.status.subscribe(callback)
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// Feed a platform connectivity signal and publish the new status.
    ///
    /// Replay on reconnect is driven by [`SyncEngine::start`].
    pub fn report_connectivity(&self, online: bool) -> Option<Transition> {
        let transition = self.monitor.report(online);
        self.status.set_connectivity(self.monitor.state());
        transition
    }

    pub fn acknowledge_reconnect(&self) {
        self.monitor.acknowledge_reconnect();
        self.status.set_connectivity(self.monitor.state());
    }

    /// Replay the write queue now, regardless of connectivity transitions.
    pub async fn replay_now(&self) -> Result<ReplayReport, Error> {
        self.replay.run().await
    }

    /// Re-read the queue length into the published status.
    pub async fn refresh_status(&self) -> Result<SyncStatus, Error> {
        self.status.set_pending(self.queue.len().await?);
        self.status.set_connectivity(self.monitor.state());
        Ok(self.status.current())
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub async fn login(&self, token: &str, user: Option<Value>) -> Result<(), Error> {
        self.credentials.save(token, user).await
    }

    /// Forget credentials and every cached collection. Pending mutations stay.
    pub async fn logout(&self) -> Result<(), Error> {
        self.credentials.clear().await?;
        self.cache.clear_all().await?;
        Ok(())
    }

    /// Spawn the reconnect driver.
    ///
    /// The driver replays the queue once at startup if online, then again on
    /// every `Offline -> Online` transition. It runs until the handle is
    /// aborted.
    pub fn start(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let mut transitions = self.monitor.transitions();

        tokio::spawn(async move {
            if engine.monitor.is_online() {
                engine.replay_logged().await;
            }

            loop {
                match transitions.recv().await {
                    Ok(transition) => {
                        engine.status.set_connectivity(engine.monitor.state());
                        if transition == Transition::CameOnline {
                            engine.replay_logged().await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "reconnect driver lagged");
                        engine.status.set_connectivity(engine.monitor.state());
                        if engine.monitor.is_online() {
                            engine.replay_logged().await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn replay_logged(&self) {
        match self.replay.run().await {
            Ok(report) if report.skipped => {}
            Ok(report) => tracing::debug!(replayed = report.replayed, pending = report.remaining, "reconnect replay done"),
            Err(e) => tracing::error!(error = %e, "reconnect replay failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dispatch::Provenance;
    use crate::testing::FakeTransport;
    use crate::transport::TransportError;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tripsync_core::{MemoryStore, Method};

    async fn engine(online: bool) -> (Arc<FakeTransport>, SyncEngine) {
        engine_with(Arc::new(MemoryStore::new()), online).await
    }

    async fn engine_with(store: Arc<dyn PersistentStore>, online: bool) -> (Arc<FakeTransport>, SyncEngine) {
        let transport = Arc::new(FakeTransport::new());
        let options = EngineOptions { initially_online: online, ..Default::default() };
        let engine = SyncEngine::new(store, transport.clone(), options).await.unwrap();
        (transport, engine)
    }

    async fn wait_for_pending(engine: &SyncEngine, pending: usize) {
        let mut rx = engine.watch_status();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.pending_count == pending))
            .await
            .expect("status never reached expected pending count")
            .unwrap();
    }

    #[tokio::test]
    async fn test_offline_post_replays_on_reconnect() {
        let (transport, engine) = engine(false).await;
        transport.push_err(TransportError::Network("offline".into()));

        let body = json!({"name": "Alps"});
        let outcome = engine.dispatch(RequestSpec::post("/trips").with_json(&body).unwrap()).await.unwrap();
        assert!(outcome.is_offline() && outcome.is_queued());
        assert_eq!(engine.queue_status().await.unwrap().pending_count, 1);

        let _driver = engine.start();
        engine.report_connectivity(true);
        wait_for_pending(&engine, 0).await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].method, Method::Post);
        assert_eq!(calls[1].url, "/trips");
        assert_eq!(serde_json::from_slice::<Value>(calls[1].body.as_ref().unwrap()).unwrap(), body);
    }

    #[tokio::test]
    async fn test_online_500_serves_cached_categories() {
        let (transport, engine) = engine(true).await;
        engine.cache_write("categories", json!([{"id": 1, "name": "Food"}])).await.unwrap();
        transport.push_status(500);

        let outcome = engine.dispatch(crate::Resource::Categories.request()).await.unwrap();
        assert_eq!(outcome.provenance(), Provenance::CacheFallback);
        assert_eq!(outcome.data(), Some(json!([{"id": 1, "name": "Food"}])));
    }

    #[tokio::test]
    async fn test_cache_last_write_wins() {
        let (_, engine) = engine(true).await;
        engine.cache_write("k", json!("A")).await.unwrap();
        let _ = engine.cache_read("k").await.unwrap();
        engine.cache_write("k", json!("B")).await.unwrap();
        assert_eq!(engine.cache_read("k").await.unwrap().unwrap().data, json!("B"));
    }

    #[tokio::test]
    async fn test_fresh_entry_is_not_stale() {
        let (_, engine) = engine(true).await;
        let entry = engine.cache_write("trips", json!([])).await.unwrap();
        assert!(!engine.is_stale(Some(&entry)));
        assert!(engine.is_stale(None));
    }

    #[tokio::test]
    async fn test_status_subscription_tracks_queue_and_connectivity() {
        let (transport, engine) = engine(true).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = engine.on_sync_status_change(move |s| {
            let _ = tx.send(s);
        });

        engine.report_connectivity(false);
        let status = rx.recv().await.unwrap();
        assert!(!status.online);

        transport.push_err(TransportError::Network("offline".into()));
        engine.dispatch(RequestSpec::delete("/trips/3")).await.unwrap();
        let status = rx.recv().await.unwrap();
        assert_eq!(status.pending_count, 1);

        drop(sub);
        engine.report_connectivity(true);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_was_offline_and_acknowledge() {
        let (_, engine) = engine(false).await;
        engine.report_connectivity(true);
        assert!(engine.sync_status().was_offline);

        engine.acknowledge_reconnect();
        assert_eq!(engine.sync_status(), SyncStatus { online: true, was_offline: false, pending_count: 0 });
    }

    #[tokio::test]
    async fn test_driver_replays_pending_on_start() {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        WriteQueue::new(store.clone()).enqueue(QueueEntry::from_request(&RequestSpec::post("/trips"))).await.unwrap();

        let (transport, engine) = engine_with(store, true).await;
        assert_eq!(engine.sync_status().pending_count, 1);

        let driver = engine.start();
        wait_for_pending(&engine, 0).await;
        driver.abort();
        assert_eq!(transport.call_urls(), vec!["/trips"]);
    }

    #[tokio::test]
    async fn test_discard_pending() {
        let (transport, engine) = engine(false).await;
        transport.push_err(TransportError::Timeout);
        transport.push_err(TransportError::Timeout);
        engine.dispatch(RequestSpec::post("/trips")).await.unwrap();
        engine.dispatch(RequestSpec::post("/categories")).await.unwrap();

        assert_eq!(engine.discard_pending().await.unwrap(), 2);
        assert_eq!(engine.sync_status().pending_count, 0);
        assert!(engine.queue_status().await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn test_logout_keeps_pending_mutations() {
        let (transport, engine) = engine(false).await;
        engine.login("tok", Some(json!({"id": 1}))).await.unwrap();
        engine.cache_write("cached-trips", json!([])).await.unwrap();
        transport.push_err(TransportError::Timeout);
        engine.dispatch(RequestSpec::post("/trips")).await.unwrap();

        engine.logout().await.unwrap();
        assert!(!engine.credentials().is_authenticated().await.unwrap());
        assert!(engine.cache_keys().await.unwrap().is_empty());
        assert_eq!(engine.queue_status().await.unwrap().pending_count, 1);
    }

    #[tokio::test]
    async fn test_engines_are_isolated() {
        let (t1, e1) = engine(false).await;
        let (_, e2) = engine(false).await;
        t1.push_err(TransportError::Timeout);
        e1.dispatch(RequestSpec::post("/trips")).await.unwrap();

        assert_eq!(e1.queue_status().await.unwrap().pending_count, 1);
        assert_eq!(e2.queue_status().await.unwrap().pending_count, 0);
    }

    #[tokio::test]
    async fn test_open_with_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig { db_path: dir.path().join("store.sqlite"), ..Default::default() };

        let engine = SyncEngine::open(&config).await.unwrap();
        engine.cache_write("categories", json!([1])).await.unwrap();
        drop(engine);

        let engine = SyncEngine::open(&config).await.unwrap();
        assert_eq!(engine.cache_read("categories").await.unwrap().unwrap().data, json!([1]));
    }
}
