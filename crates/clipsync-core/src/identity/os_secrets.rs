//! Secret store backed by the operating system's credential manager
//!
//! macOS keychain or Windows Credential Manager, through `keyring`. Entries
//! live outside the data directory, so a copied data directory does not
//! carry the key that opens its identity blob.

use keyring::Entry;

use super::secret::SecretStore;
use crate::error::ClipSyncError;

/// [`SecretStore`] over the platform credential manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSecretStore;

impl OsSecretStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, account: &str) -> Result<Entry, ClipSyncError> {
        Entry::new(service, account).map_err(|e| {
            ClipSyncError::SecretStore(format!("Credential entry {service}/{account}: {e}"))
        })
    }
}

fn store_error(action: &str, e: keyring::Error) -> ClipSyncError {
    ClipSyncError::SecretStore(format!("Failed to {action} credential: {e}"))
}

impl SecretStore for OsSecretStore {
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>, ClipSyncError> {
        match Self::entry(service, account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(store_error("read", e)),
        }
    }

    fn set_secret(&self, service: &str, account: &str, secret: &str) -> Result<bool, ClipSyncError> {
        if self.get_secret(service, account)?.is_some() {
            return Ok(false);
        }
        Self::entry(service, account)?
            .set_password(secret)
            .map_err(|e| store_error("create", e))?;
        Ok(true)
    }

    fn update_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<bool, ClipSyncError> {
        if self.get_secret(service, account)?.is_none() {
            return Ok(false);
        }
        Self::entry(service, account)?
            .set_password(secret)
            .map_err(|e| store_error("update", e))?;
        Ok(true)
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<bool, ClipSyncError> {
        match Self::entry(service, account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(store_error("delete", e)),
        }
    }
}
