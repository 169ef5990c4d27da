//! Secure-storage facilities used by the identity backends
//!
//! [`SecretStore`] mirrors an OS keychain: string secrets addressed by a
//! service name and an account. [`DataProtector`] mirrors a platform
//! data-protection API that encrypts and decrypts without handing out a key.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::crypto::SecretCipher;
use crate::error::ClipSyncError;

/// Keychain-style secret storage.
pub trait SecretStore: Send + Sync {
    /// Look up a secret. `Ok(None)` means no entry exists.
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>, ClipSyncError>;

    /// Create a new entry. Returns `false` if one already exists.
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> Result<bool, ClipSyncError>;

    /// Replace an existing entry. Returns `false` if none exists.
    fn update_secret(&self, service: &str, account: &str, secret: &str)
        -> Result<bool, ClipSyncError>;

    /// Remove an entry. Returns `false` if none existed.
    fn delete_secret(&self, service: &str, account: &str) -> Result<bool, ClipSyncError>;
}

/// In-memory secret store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>, ClipSyncError> {
        Ok(self
            .entries
            .lock()
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn set_secret(&self, service: &str, account: &str, secret: &str) -> Result<bool, ClipSyncError> {
        let mut entries = self.entries.lock();
        let key = (service.to_string(), account.to_string());
        if entries.contains_key(&key) {
            return Ok(false);
        }
        entries.insert(key, secret.to_string());
        Ok(true)
    }

    fn update_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<bool, ClipSyncError> {
        let mut entries = self.entries.lock();
        match entries.get_mut(&(service.to_string(), account.to_string())) {
            Some(existing) => {
                *existing = secret.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<bool, ClipSyncError> {
        Ok(self
            .entries
            .lock()
            .remove(&(service.to_string(), account.to_string()))
            .is_some())
    }
}

/// Platform data-protection capability.
pub trait DataProtector: Send + Sync {
    fn protect(&self, data: &[u8]) -> Result<Vec<u8>, ClipSyncError>;
    fn unprotect(&self, data: &[u8]) -> Result<Vec<u8>, ClipSyncError>;
}

/// Service name under which [`SealedDataProtector`] keeps its device key.
pub const DATA_PROTECTION_SERVICE: &str = "clipsync-data-protection";

/// Data protector sealing with a device key kept in a [`SecretStore`].
///
/// The key is created on first `protect`. `unprotect` never creates one:
/// a missing key means the data cannot be recovered.
pub struct SealedDataProtector {
    secrets: Arc<dyn SecretStore>,
    account: String,
}

impl SealedDataProtector {
    pub fn new(secrets: Arc<dyn SecretStore>, account: impl Into<String>) -> Self {
        Self {
            secrets,
            account: account.into(),
        }
    }

    fn existing_cipher(&self) -> Result<Option<SecretCipher>, ClipSyncError> {
        match self.secrets.get_secret(DATA_PROTECTION_SERVICE, &self.account)? {
            Some(encoded) => Ok(Some(SecretCipher::new(&SecretCipher::key_from_string(
                &encoded,
            )?))),
            None => Ok(None),
        }
    }

    fn create_cipher(&self) -> Result<SecretCipher, ClipSyncError> {
        let key = SecretCipher::generate_key();
        store_secret(
            self.secrets.as_ref(),
            DATA_PROTECTION_SERVICE,
            &self.account,
            &SecretCipher::key_to_string(&key),
        )?;
        Ok(SecretCipher::new(&key))
    }
}

impl DataProtector for SealedDataProtector {
    fn protect(&self, data: &[u8]) -> Result<Vec<u8>, ClipSyncError> {
        let cipher = match self.existing_cipher() {
            Ok(Some(cipher)) => cipher,
            Ok(None) => self.create_cipher()?,
            Err(e) => {
                tracing::warn!(error = %e, "Data protection key unreadable, replacing it");
                self.create_cipher()?
            }
        };
        cipher.encrypt(data)
    }

    fn unprotect(&self, data: &[u8]) -> Result<Vec<u8>, ClipSyncError> {
        let cipher = self.existing_cipher()?.ok_or_else(|| {
            ClipSyncError::SecretStore("No data protection key for this device".to_string())
        })?;
        cipher.decrypt(data)
    }
}

/// Create the entry, or overwrite it if an unreadable one is in the way.
pub(crate) fn store_secret(
    secrets: &dyn SecretStore,
    service: &str,
    account: &str,
    secret: &str,
) -> Result<(), ClipSyncError> {
    if secrets.set_secret(service, account, secret)? || secrets.update_secret(service, account, secret)? {
        Ok(())
    } else {
        Err(ClipSyncError::SecretStore(format!(
            "Could not store secret for {service}/{account}"
        )))
    }
}
