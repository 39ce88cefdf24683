//! Credential persistence in the system keyring
use async_trait::async_trait;
use graphlink_core::{CredentialPersistence, CredentialStoreError};
use graphlink_domain::CredentialPair;
use keyring::Entry;
use tracing::debug;

use crate::errors::credential_error;

pub const DEFAULT_SERVICE_NAME: &str = "com.graphlink.client";
const ENTRY_NAME: &str = "session_credentials";

/// Stores the credential pair as one JSON secret in the OS keychain
pub struct KeychainCredentialStore {
    entry: Entry,
}

impl KeychainCredentialStore {
    /// Open the keychain entry for `service`
    ///
    /// # Errors
    /// Returns `CredentialStoreError::Backend` if the platform keychain is
    /// unavailable
    pub fn new(service: &str) -> Result<Self, CredentialStoreError> {
        let entry = Entry::new(service, ENTRY_NAME).map_err(credential_error)?;
        Ok(Self { entry })
    }
}

impl std::fmt::Debug for KeychainCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainCredentialStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialPersistence for KeychainCredentialStore {
    async fn load(&self) -> Result<Option<CredentialPair>, CredentialStoreError> {
        let secret = match self.entry.get_password() {
            Ok(secret) => secret,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(credential_error(e)),
        };

        serde_json::from_str(&secret)
            .map(Some)
            .map_err(|e| CredentialStoreError::Corrupt(format!("keychain entry is not a credential pair: {e}")))
    }

    async fn save(&self, pair: &CredentialPair) -> Result<(), CredentialStoreError> {
        let secret = serde_json::to_string(pair)
            .map_err(|e| CredentialStoreError::Backend(format!("failed to encode credentials: {e}")))?;
        self.entry.set_password(&secret).map_err(credential_error)?;
        debug!("credentials written to keychain");
        Ok(())
    }

    async fn remove(&self) -> Result<(), CredentialStoreError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(credential_error(e)),
        }
    }
}
