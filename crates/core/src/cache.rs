//! Read-through cache mirror.
//!
//! Whole collections are cached under stable logical keys such as
//! `cached-trips` or `itineraries-42`. Entries are last-write-wins and never
//! expire on their own: staleness is advisory and left to the caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::PersistentStore;
use crate::{Error, is_reserved_key};

/// A cached collection with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: Value,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(data: Value) -> Self {
        Self { data, cached_at: Utc::now() }
    }

    /// Age of the entry relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.cached_at
    }
}

/// `true` if `entry` is absent or older than `max_age_minutes`.
///
/// A threshold too large to represent as a duration never marks a present
/// entry stale.
pub fn is_stale(entry: Option<&CacheEntry>, max_age_minutes: i64) -> bool {
    is_stale_at(entry, max_age_minutes, Utc::now())
}

/// Staleness check against an explicit clock.
pub fn is_stale_at(entry: Option<&CacheEntry>, max_age_minutes: i64, now: DateTime<Utc>) -> bool {
    match entry {
        Some(entry) => Duration::try_minutes(max_age_minutes).is_some_and(|max_age| entry.age(now) > max_age),
        None => true,
    }
}

/// Human readable age of a cache entry, e.g. "5 minutes ago".
pub fn age_label(entry: Option<&CacheEntry>, now: DateTime<Utc>) -> String {
    let Some(entry) = entry else {
        return "Unknown".to_string();
    };

    let minutes = entry.age(now).num_minutes();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{minutes} minutes ago")
    } else if minutes < 1440 {
        format!("{} hours ago", minutes / 60)
    } else {
        format!("{} days ago", minutes / 1440)
    }
}

/// Cache mirror on top of a persistent store.
#[derive(Clone)]
pub struct CacheMirror {
    store: Arc<dyn PersistentStore>,
}

impl CacheMirror {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// Look up the entry for `key`.
    ///
    /// Reserved keys are never treated as cache entries. A value that does not
    /// decode as an entry is reported as a serialization error.
    pub async fn read(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        if is_reserved_key(key) {
            return Ok(None);
        }

        match self.store.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the entry for `key` with `data` stamped now.
    pub async fn write(&self, key: &str, data: Value) -> Result<CacheEntry, Error> {
        if key.is_empty() {
            return Err(Error::InvalidRequest("cache key cannot be empty".into()));
        }
        if is_reserved_key(key) {
            return Err(Error::ReservedKey(key.to_string()));
        }

        let entry = CacheEntry::new(data);
        self.store.set(key, serde_json::to_value(&entry)?).await?;
        tracing::debug!(key, "cache entry written");
        Ok(entry)
    }

    /// Keys of every cache entry.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let keys = self.store.list_keys().await?;
        Ok(keys.into_iter().filter(|k| !is_reserved_key(k)).collect())
    }

    /// Remove every cache entry, leaving queue and credential keys intact.
    ///
    /// Returns the number of removed entries.
    pub async fn clear_all(&self) -> Result<usize, Error> {
        let keys = self.keys().await?;
        for key in &keys {
            self.store.delete(key).await?;
        }
        tracing::info!(removed = keys.len(), "cache cleared");
        Ok(keys.len())
    }
}
