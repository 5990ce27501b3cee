//! SQLite-backed persistent store.
//!
//! Opens the database, applies pragmas for durability under WAL, and runs
//! migrations. Rows are keyed by `(origin, key)` so several backends can
//! share one database file without seeing each other's state.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio_rusqlite::{Connection, params, rusqlite};

use super::{PersistentStore, migrations};
use crate::Error;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA busy_timeout=5000;
     PRAGMA foreign_keys=ON;";

/// Persistent store handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    conn: Connection,
    origin: String,
}

impl SqliteStore {
    /// Open a store at the specified path, scoped to `origin`.
    ///
    /// Creates the file if it doesn't exist, applies pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>, origin: impl Into<String>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::StorageUnavailable(format!("failed to create {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path).await.map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        Self::init(conn, origin.into()).await
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory(origin: impl Into<String>) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        Self::init(conn, origin.into()).await
    }

    async fn init(conn: Connection, origin: String) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(|e: tokio_rusqlite::Error<rusqlite::Error>| Error::from(e))?;

        migrations::run(&conn).await?;

        tracing::debug!(origin = %origin, "opened persistent store");
        Ok(Self { conn, origin })
    }

    /// The origin this store is scoped to.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        let origin = self.origin.clone();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Value>, Error> {
                let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE origin = ?1 AND key = ?2")?;
                let result = stmt.query_row(params![origin, key], |row| row.get::<_, String>(0));

                match result {
                    Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), Error> {
        let origin = self.origin.clone();
        let key = key.to_string();
        let text = serde_json::to_string(&value)?;
        let updated_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO kv_store (origin, key, value, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(origin, key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![origin, key, text, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let origin = self.origin.clone();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM kv_store WHERE origin = ?1 AND key = ?2", params![origin, key])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn list_keys(&self) -> Result<Vec<String>, Error> {
        let origin = self.origin.clone();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT key FROM kv_store WHERE origin = ?1 ORDER BY key")?;
                let keys = stmt
                    .query_map(params![origin], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }
}
