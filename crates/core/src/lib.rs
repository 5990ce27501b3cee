//! Core types and durable state for tripsync.
//!
//! This crate provides:
//! - Origin-scoped persistent key/value store with SQLite backend
//! - Cache mirror for read-through collection caching
//! - Durable FIFO write queue for deferred mutations
//! - Credential storage
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod queue;
pub mod request;
pub mod store;

pub use cache::{CacheEntry, CacheMirror};
pub use config::{ConfigError, SyncConfig};
pub use credentials::CredentialStore;
pub use error::Error;
pub use queue::{QueueEntry, WriteQueue};
pub use request::{Method, RequestSpec};
pub use store::{MemoryStore, PersistentStore, SqliteStore};

/// Keys owned by the write queue and credential store.
///
/// The cache mirror owns every other key in a store scope.
pub const RESERVED_KEYS: &[&str] = &[
    queue::QUEUE_KEY,
    queue::DEAD_LETTER_KEY,
    credentials::TOKEN_KEY,
    credentials::USER_KEY,
];

/// Whether a key belongs to a non-cache namespace.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}
