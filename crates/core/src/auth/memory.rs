//! In-memory credential persistence
//!
//! Used by memory-only sessions and throughout the test suites.

use async_trait::async_trait;
use graphlink_domain::CredentialPair;
use parking_lot::Mutex;

use super::token_store::CredentialStoreError;
use crate::ports::CredentialPersistence;

/// Credential persistence that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    pair: Mutex<Option<CredentialPair>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store, e.g. to simulate a previous session
    pub fn with_pair(pair: CredentialPair) -> Self {
        Self { pair: Mutex::new(Some(pair)) }
    }
}

#[async_trait]
impl CredentialPersistence for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<CredentialPair>, CredentialStoreError> {
        Ok(self.pair.lock().clone())
    }

    async fn save(&self, pair: &CredentialPair) -> Result<(), CredentialStoreError> {
        *self.pair.lock() = Some(pair.clone());
        Ok(())
    }

    async fn remove(&self) -> Result<(), CredentialStoreError> {
        self.pair.lock().take();
        Ok(())
    }
}
