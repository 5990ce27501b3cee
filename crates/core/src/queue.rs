//! Durable FIFO write queue.
//!
//! Mutations that fail while offline are appended here and replayed in order
//! once connectivity returns. The queue is append-only at the tail and
//! consume-only at the head; entries are never reordered or deduplicated.
//!
//! The whole queue is stored as one ordered array under [`QUEUE_KEY`]. Entries
//! abandoned by the replay engine move to [`DEAD_LETTER_KEY`].

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::store::PersistentStore;
use crate::{Error, Method, RequestSpec};

pub const QUEUE_KEY: &str = "offline-queue";
pub const DEAD_LETTER_KEY: &str = "offline-dead-letter";

/// A deferred mutation. Identity is its position in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub url: String,
    pub method: Method,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Bytes>,
    pub enqueued_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueueEntry {
    /// Capture a request for later replay.
    pub fn from_request(spec: &RequestSpec) -> Self {
        Self {
            url: spec.url.clone(),
            method: spec.method,
            headers: spec.headers.clone(),
            body: spec.body.clone(),
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    /// Rebuild the request exactly as it was queued.
    pub fn to_request(&self) -> RequestSpec {
        RequestSpec {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            cache_key: None,
        }
    }
}

/// A queue entry that was permanently abandoned during replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub entry: QueueEntry,
    pub reason: String,
    pub abandoned_at: DateTime<Utc>,
}

/// FIFO queue of pending mutations backed by a persistent store.
///
/// Read-modify-write cycles are serialized through an async mutex so that
/// concurrent dispatches in one process never lose an entry. Sharing one store
/// between processes is not supported.
#[derive(Clone)]
pub struct WriteQueue {
    store: Arc<dyn PersistentStore>,
    lock: Arc<Mutex<()>>,
}

impl WriteQueue {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store, lock: Arc::new(Mutex::new(())) }
    }

    /// Append `entry` to the tail. Returns the new queue length.
    pub async fn enqueue(&self, entry: QueueEntry) -> Result<usize, Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        tracing::info!(method = %entry.method, url = %entry.url, position = entries.len(), "queued mutation");
        entries.push(entry);
        self.save(&entries).await?;
        Ok(entries.len())
    }

    /// The oldest pending entry.
    pub async fn peek_head(&self) -> Result<Option<QueueEntry>, Error> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_iter().next())
    }

    /// Remove the current head and return it.
    ///
    /// # Errors
    ///
    /// Returns `Error::QueueEmpty` if there is nothing to remove.
    pub async fn dequeue_head(&self) -> Result<QueueEntry, Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.is_empty() {
            return Err(Error::QueueEmpty);
        }
        let head = entries.remove(0);
        self.save(&entries).await?;
        Ok(head)
    }

    /// Remove the head only if it is still `expected`.
    ///
    /// Returns `false` when the queue was cleared or replaced underneath a
    /// replay, so a confirmed request never removes a different entry.
    pub async fn complete_head(&self, expected: &QueueEntry) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.first() != Some(expected) {
            return Ok(false);
        }
        entries.remove(0);
        self.save(&entries).await?;
        Ok(true)
    }

    /// Count a failed replay attempt against the head entry.
    ///
    /// Returns the updated head, or `None` if the head is no longer `expected`.
    pub async fn record_failure(&self, expected: &QueueEntry, reason: &str) -> Result<Option<QueueEntry>, Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let Some(head) = entries.first_mut().filter(|head| **head == *expected) else {
            return Ok(None);
        };
        head.attempts += 1;
        head.last_error = Some(reason.to_string());
        let updated = head.clone();
        self.save(&entries).await?;
        Ok(Some(updated))
    }

    /// Move the head entry to the dead-letter list.
    ///
    /// Returns `false` if the head is no longer `expected`.
    pub async fn dead_letter_head(&self, expected: &QueueEntry, reason: &str) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.first() != Some(expected) {
            return Ok(false);
        }
        let entry = entries.remove(0);

        let mut dead: Vec<DeadLetter> = self.load_list(DEAD_LETTER_KEY).await?;
        tracing::warn!(method = %entry.method, url = %entry.url, attempts = entry.attempts, reason, "abandoning queued mutation");
        dead.push(DeadLetter { entry, reason: reason.to_string(), abandoned_at: Utc::now() });

        self.store.set(DEAD_LETTER_KEY, serde_json::to_value(&dead)?).await?;
        self.save(&entries).await?;
        Ok(true)
    }

    /// All pending entries, oldest first.
    pub async fn list(&self) -> Result<Vec<QueueEntry>, Error> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    pub async fn len(&self) -> Result<usize, Error> {
        Ok(self.list().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }

    /// Discard every pending entry. Returns how many were dropped.
    pub async fn clear(&self) -> Result<usize, Error> {
        let _guard = self.lock.lock().await;
        let dropped = self.load().await?.len();
        self.save(&[]).await?;
        tracing::info!(dropped, "pending mutations discarded");
        Ok(dropped)
    }

    /// Entries abandoned by replay, oldest first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, Error> {
        let _guard = self.lock.lock().await;
        self.load_list(DEAD_LETTER_KEY).await
    }

    /// Purge the dead-letter list. Returns how many were dropped.
    pub async fn clear_dead_letters(&self) -> Result<usize, Error> {
        let _guard = self.lock.lock().await;
        let dropped = self.load_list::<DeadLetter>(DEAD_LETTER_KEY).await?.len();
        self.store.delete(DEAD_LETTER_KEY).await?;
        Ok(dropped)
    }

    async fn load(&self) -> Result<Vec<QueueEntry>, Error> {
        self.load_list(QUEUE_KEY).await
    }

    async fn save(&self, entries: &[QueueEntry]) -> Result<(), Error> {
        self.store.set(QUEUE_KEY, serde_json::to_value(entries)?).await
    }

    async fn load_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, Error> {
        match self.store.get(key).await? {
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(value) => Ok(serde_json::from_value(value)?),
        }
    }
}
