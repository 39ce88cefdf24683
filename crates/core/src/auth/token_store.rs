//! Credential store
//!
//! Holds the current credential pair in memory and mirrors every change to
//! a [`CredentialPersistence`] backend. Reads are synchronous so the auth
//! middleware never waits on I/O.

use std::sync::Arc;

use graphlink_domain::CredentialPair;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::ports::CredentialPersistence;

/// Error type for credential persistence
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialStoreError {
    /// The persistence backend failed
    #[error("Credential storage error: {0}")]
    Backend(String),

    /// Stored data could not be decoded
    #[error("Stored credentials are corrupt: {0}")]
    Corrupt(String),
}

/// Current credential pair plus its persistence mirror
pub struct TokenStore {
    current: RwLock<Option<CredentialPair>>,
    persistence: Arc<dyn CredentialPersistence>,
}

impl TokenStore {
    /// Create an empty store over the given backend
    pub fn new(persistence: Arc<dyn CredentialPersistence>) -> Self {
        Self { current: RwLock::new(None), persistence }
    }

    /// Load persisted credentials into memory.
    ///
    /// Should be called on startup. Returns `true` if a pair was found.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read
    pub async fn initialize(&self) -> Result<bool, CredentialStoreError> {
        match self.persistence.load().await? {
            Some(pair) => {
                *self.current.write() = Some(pair);
                info!("Credential store initialized with existing credentials");
                Ok(true)
            }
            None => {
                debug!("No persisted credentials found");
                Ok(false)
            }
        }
    }

    /// Current pair, `None` when unauthenticated
    pub fn get(&self) -> Option<CredentialPair> {
        self.current.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|pair| pair.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current.read().as_ref().and_then(|pair| pair.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Replace the pair (login or successful refresh).
    ///
    /// Memory is updated before persisting, so a persistence failure never
    /// leaves the in-memory session stale.
    ///
    /// # Errors
    /// Returns error if the backend rejects the write
    pub async fn set(&self, pair: CredentialPair) -> Result<(), CredentialStoreError> {
        *self.current.write() = Some(pair.clone());
        self.persistence.save(&pair).await
    }

    /// Swap in a refreshed access credential, keeping the refresh credential.
    ///
    /// Returns `Ok(false)` when there is no pair to update.
    ///
    /// # Errors
    /// Returns error if the backend rejects the write
    pub async fn replace_access_token(
        &self,
        access_token: String,
        expires_in: Option<i64>,
    ) -> Result<bool, CredentialStoreError> {
        let updated = {
            let mut current = self.current.write();
            let Some(pair) = current.as_mut() else {
                return Ok(false);
            };
            pair.access_token = access_token;
            pair.expires_at = None;
            if let Some(expires_in) = expires_in {
                *pair = pair.clone().with_expires_in(expires_in);
            }
            pair.clone()
        };
        self.persistence.save(&updated).await?;
        Ok(true)
    }

    /// Drop the pair (logout or irrecoverable refresh failure)
    ///
    /// # Errors
    /// Returns error if the backend cannot remove the stored pair
    pub async fn clear(&self) -> Result<(), CredentialStoreError> {
        *self.current.write() = None;
        self.persistence.remove().await
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").field("authenticated", &self.is_authenticated()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryCredentialStore;

    fn pair(access: &str) -> CredentialPair {
        CredentialPair::new(access, Some("refresh".to_string()))
    }

    #[tokio::test]
    async fn test_empty_store_is_unauthenticated() {
        let store = TokenStore::new(Arc::new(MemoryCredentialStore::new()));
        assert!(!store.initialize().await.unwrap());
        assert!(!store.is_authenticated());
        assert_eq!(store.access_token(), None);
    }

    #[tokio::test]
    async fn test_set_get_clear_mirror_persistence() {
        let backend = Arc::new(MemoryCredentialStore::new());
        let store = TokenStore::new(backend.clone());

        store.set(pair("access-1")).await.unwrap();
        assert_eq!(store.access_token().as_deref(), Some("access-1"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh"));
        assert_eq!(backend.load().await.unwrap(), Some(pair("access-1")));

        store.clear().await.unwrap();
        assert!(store.get().is_none());
        assert_eq!(backend.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_access_token_keeps_refresh_credential() {
        let backend = Arc::new(MemoryCredentialStore::new());
        let store = TokenStore::new(backend.clone());
        assert!(!store.replace_access_token("orphan".into(), None).await.unwrap());

        store.set(pair("access-1")).await.unwrap();
        assert!(store.replace_access_token("access-2".into(), Some(600)).await.unwrap());

        let current = store.get().unwrap();
        assert_eq!(current.access_token, "access-2");
        assert_eq!(current.refresh_token.as_deref(), Some("refresh"));
        assert!(current.seconds_until_expiry().is_some_and(|s| s > 500));
        assert_eq!(backend.load().await.unwrap(), Some(current));
    }

    #[tokio::test]
    async fn test_initialize_loads_persisted_pair() {
        let backend = Arc::new(MemoryCredentialStore::with_pair(pair("persisted")));
        let store = TokenStore::new(backend);

        assert!(store.initialize().await.unwrap());
        assert_eq!(store.access_token().as_deref(), Some("persisted"));
    }
}
