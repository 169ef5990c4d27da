//! Peer Identity Storage - identity keys of paired devices
//!
//! One public key per device id, recorded at pairing time. A device that
//! later presents a different key is not trusted until it is saved again.

use crate::error::ClipSyncError;
use ed25519_dalek::VerifyingKey;
use redb::{ReadableTable, TableDefinition};

use super::Storage;

/// Table for peer identity keys (key: device id, value: 32-byte public key)
pub(crate) const PEER_IDENTITIES_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("peer_identities");

fn decode_key(bytes: &[u8]) -> Result<VerifyingKey, ClipSyncError> {
    let raw: [u8; 32] = bytes.try_into().map_err(|_| {
        ClipSyncError::Serialization(format!("Peer identity key has {} bytes", bytes.len()))
    })?;
    VerifyingKey::from_bytes(&raw)
        .map_err(|e| ClipSyncError::Serialization(format!("Invalid peer identity key: {}", e)))
}

impl Storage {
    /// Record `key` as the identity of `device_id`.
    ///
    /// Returns `true` if this replaced a different key, meaning the device's
    /// identity changed since it was last saved.
    pub fn save_peer_identity(
        &self,
        device_id: &str,
        key: &VerifyingKey,
    ) -> Result<bool, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let replaced = {
            let mut table = write_txn.open_table(PEER_IDENTITIES_TABLE)?;
            let previous = table.get(device_id)?.map(|v| v.value().to_vec());
            table.insert(device_id, key.as_bytes().as_slice())?;
            previous.is_some_and(|bytes| bytes.as_slice() != key.as_bytes())
        };
        write_txn.commit()?;
        if replaced {
            tracing::warn!(device_id, "Peer identity key changed");
        }
        Ok(replaced)
    }

    /// The identity key saved for `device_id`, if any.
    pub fn peer_identity(&self, device_id: &str) -> Result<Option<VerifyingKey>, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(PEER_IDENTITIES_TABLE)?;

        match table.get(device_id)? {
            Some(v) => Ok(Some(decode_key(v.value())?)),
            None => Ok(None),
        }
    }

    /// Whether `key` is the identity saved for `device_id`.
    ///
    /// An unknown device is not trusted.
    pub fn is_trusted_peer_identity(
        &self,
        device_id: &str,
        key: &VerifyingKey,
    ) -> Result<bool, ClipSyncError> {
        Ok(self.peer_identity(device_id)?.as_ref() == Some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKeyPair;
    use tempfile::TempDir;

    fn public_key() -> VerifyingKey {
        IdentityKeyPair::generate().unwrap().public_key()
    }

    #[test]
    fn test_unknown_peer_is_not_trusted() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb")).unwrap();

        assert!(storage.peer_identity("device-B").unwrap().is_none());
        assert!(!storage.is_trusted_peer_identity("device-B", &public_key()).unwrap());
    }

    #[test]
    fn test_changed_key_is_untrusted_until_saved() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb")).unwrap();
        let original = public_key();
        let rotated = public_key();

        assert!(!storage.save_peer_identity("device-B", &original).unwrap());
        assert_eq!(storage.peer_identity("device-B").unwrap(), Some(original));
        assert!(storage.is_trusted_peer_identity("device-B", &original).unwrap());
        assert!(!storage.is_trusted_peer_identity("device-B", &rotated).unwrap());

        // Saving the same key again is not a change
        assert!(!storage.save_peer_identity("device-B", &original).unwrap());

        assert!(storage.save_peer_identity("device-B", &rotated).unwrap());
        assert!(storage.is_trusted_peer_identity("device-B", &rotated).unwrap());
        assert!(!storage.is_trusted_peer_identity("device-B", &original).unwrap());
        assert!(!storage.is_trusted_peer_identity("device-C", &rotated).unwrap());
    }

    #[test]
    fn test_peer_identities_persist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.redb");
        let key = public_key();

        Storage::new(&path)
            .unwrap()
            .save_peer_identity("device-B", &key)
            .unwrap();

        let storage = Storage::new(&path).unwrap();
        assert!(storage.is_trusted_peer_identity("device-B", &key).unwrap());
    }
}
