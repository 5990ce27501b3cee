//! Persisted bearer credentials.

use std::sync::Arc;

use serde_json::Value;

use crate::Error;
use crate::store::PersistentStore;

pub const TOKEN_KEY: &str = "auth-token";
pub const USER_KEY: &str = "auth-user";

/// Bearer token and user profile kept alongside the cache and queue.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn PersistentStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    pub async fn token(&self) -> Result<Option<String>, Error> {
        Ok(self.store.get(TOKEN_KEY).await?.and_then(|v| v.as_str().map(String::from)))
    }

    pub async fn user(&self) -> Result<Option<Value>, Error> {
        self.store.get(USER_KEY).await
    }

    /// Store a token and, optionally, the user profile returned with it.
    pub async fn save(&self, token: &str, user: Option<Value>) -> Result<(), Error> {
        self.store.set(TOKEN_KEY, Value::String(token.to_string())).await?;
        match user {
            Some(user) => self.store.set(USER_KEY, user).await,
            None => self.store.delete(USER_KEY).await,
        }
    }

    /// Forget the token and user profile.
    pub async fn clear(&self) -> Result<(), Error> {
        self.store.delete(TOKEN_KEY).await?;
        self.store.delete(USER_KEY).await?;
        tracing::info!("local credentials cleared");
        Ok(())
    }

    pub async fn is_authenticated(&self) -> Result<bool, Error> {
        Ok(self.token().await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_clear() {
        let creds = CredentialStore::new(Arc::new(MemoryStore::new()));
        assert!(!creds.is_authenticated().await.unwrap());

        creds.save("abc", Some(json!({"id": 7, "name": "Dara"}))).await.unwrap();
        assert_eq!(creds.token().await.unwrap().as_deref(), Some("abc"));
        assert_eq!(creds.user().await.unwrap().unwrap()["id"], 7);

        creds.clear().await.unwrap();
        assert!(creds.token().await.unwrap().is_none());
        assert!(creds.user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_without_user_drops_stale_profile() {
        let creds = CredentialStore::new(Arc::new(MemoryStore::new()));
        creds.save("old", Some(json!({"id": 1}))).await.unwrap();
        creds.save("new", None).await.unwrap();
        assert!(creds.user().await.unwrap().is_none());
    }
}
