//! Durable key/value storage.
//!
//! Everything the sync core persists goes through [`PersistentStore`]. The
//! cache mirror and write queue each own a disjoint set of keys inside one
//! store scope and never read each other's entries.

mod migrations;
mod sqlite;

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::Error;

pub use sqlite::SqliteStore;

/// Origin-scoped key/value store that survives process restart.
///
/// Every operation may fail with `Error::StorageUnavailable`; callers must
/// propagate it rather than continue with partial state.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Look up the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>, Error>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<(), Error>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// List all keys in this store scope, sorted.
    async fn list_keys(&self) -> Result<Vec<String>, Error>;
}

/// In-memory store for tests and ephemeral sessions.
///
/// Can be switched into an unavailable or read-only state to exercise
/// storage failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
    unavailable: AtomicBool,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StorageUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `set` and `delete` fail with `StorageUnavailable` while reads
    /// keep working.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn writable_entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>, Error> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable("memory store is read-only".into()));
        }
        self.entries()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>, Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable("memory store disabled".into()));
        }
        self.entries
            .lock()
            .map_err(|e| Error::StorageUnavailable(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), Error> {
        self.writable_entries()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.writable_entries()?.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.entries()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_set_get_delete() {
        let store = MemoryStore::new();
        store.set("categories", json!([1, 2])).await.unwrap();
        assert_eq!(store.get("categories").await.unwrap(), Some(json!([1, 2])));

        store.delete("categories").await.unwrap();
        assert!(store.get("categories").await.unwrap().is_none());
        store.delete("categories").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_list_keys_sorted() {
        let store = MemoryStore::new();
        store.set("trips", json!(1)).await.unwrap();
        store.set("categories", json!(2)).await.unwrap();
        assert_eq!(store.list_keys().await.unwrap(), vec!["categories", "trips"]);
    }

    #[tokio::test]
    async fn test_memory_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.set("trips", json!([])).await.unwrap_err();
        assert!(err.is_storage());

        store.set_unavailable(false);
        assert!(store.get("trips").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_read_only() {
        let store = MemoryStore::new();
        store.set("trips", json!([1])).await.unwrap();
        store.set_read_only(true);

        assert_eq!(store.get("trips").await.unwrap(), Some(json!([1])));
        assert!(store.set("trips", json!([])).await.unwrap_err().is_storage());
        assert!(store.delete("trips").await.unwrap_err().is_storage());
        assert_eq!(store.list_keys().await.unwrap(), vec!["trips"]);
    }
}
