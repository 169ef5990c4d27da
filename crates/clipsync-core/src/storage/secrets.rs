//! Secret Storage - database-backed secure-storage facility
//!
//! Used where no OS keychain is wired in. Secrets share the database file's
//! protection, so this is only as strong as the data directory's permissions.

use crate::error::ClipSyncError;
use crate::identity::SecretStore;
use redb::{ReadableTable, TableDefinition};

use super::Storage;

/// Table for secrets (key: "service/account", value: secret)
pub(crate) const SECRETS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("secrets");

fn secret_key(service: &str, account: &str) -> String {
    format!("{service}/{account}")
}

/// [`SecretStore`] backed by the `secrets` table.
#[derive(Clone)]
pub struct StorageSecretStore {
    storage: Storage,
}

impl StorageSecretStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn write(
        &self,
        service: &str,
        account: &str,
        secret: &str,
        must_exist: bool,
    ) -> Result<bool, ClipSyncError> {
        let db = self.storage.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let written = {
            let mut table = write_txn.open_table(SECRETS_TABLE)?;
            let key = secret_key(service, account);
            let exists = table.get(key.as_str())?.is_some();
            if exists == must_exist {
                table.insert(key.as_str(), secret)?;
                true
            } else {
                false
            }
        };
        write_txn.commit()?;
        Ok(written)
    }
}

impl SecretStore for StorageSecretStore {
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>, ClipSyncError> {
        let db = self.storage.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(SECRETS_TABLE)?;
        let key = secret_key(service, account);
        let secret = table.get(key.as_str())?.map(|v| v.value().to_string());
        Ok(secret)
    }

    fn set_secret(&self, service: &str, account: &str, secret: &str) -> Result<bool, ClipSyncError> {
        self.write(service, account, secret, false)
    }

    fn update_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<bool, ClipSyncError> {
        self.write(service, account, secret, true)
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<bool, ClipSyncError> {
        let db = self.storage.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SECRETS_TABLE)?;
            let key = secret_key(service, account);
            let removed = table.remove(key.as_str())?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }
}
