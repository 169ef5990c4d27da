//! Peer Directory Storage
//!
//! Paired devices and the addresses they were last seen at. Discovery
//! (mDNS) fills this table from outside the core.

use crate::error::ClipSyncError;
use crate::types::PeerRecord;
use redb::{ReadableTable, TableDefinition};

use super::Storage;

/// Table for paired devices (key: device id, value: serialized PeerRecord)
pub(crate) const PEERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("peers");

impl Storage {
    /// Save a peer, overwriting any entry for the same device.
    pub fn save_peer(&self, peer: &PeerRecord) -> Result<(), ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let mut table = write_txn.open_table(PEERS_TABLE)?;
            let serialized = postcard::to_allocvec(peer)
                .map_err(|e| ClipSyncError::Serialization(e.to_string()))?;
            table.insert(peer.device_id.as_str(), serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a peer by device id.
    pub fn load_peer(&self, device_id: &str) -> Result<Option<PeerRecord>, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(PEERS_TABLE)?;

        if let Some(data) = table.get(device_id)? {
            let peer: PeerRecord = postcard::from_bytes(data.value())
                .map_err(|e| ClipSyncError::Serialization(e.to_string()))?;
            Ok(Some(peer))
        } else {
            Ok(None)
        }
    }

    /// List all paired devices.
    pub fn list_peers(&self) -> Result<Vec<PeerRecord>, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(PEERS_TABLE)?;

        let mut peers = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let peer: PeerRecord = postcard::from_bytes(value.value())
                .map_err(|e| ClipSyncError::Serialization(e.to_string()))?;
            peers.push(peer);
        }
        Ok(peers)
    }

    /// Move `host` to the front of the peer's host list.
    ///
    /// The next probe then tries the last known-good address first.
    pub fn promote_peer_host(&self, device_id: &str, host: &str) -> Result<(), ClipSyncError> {
        if let Some(mut peer) = self.load_peer(device_id)? {
            peer.hosts.retain(|h| h != host);
            peer.hosts.insert(0, host.to_string());
            self.save_peer(&peer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_and_promote() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb")).unwrap();
        let peer = PeerRecord {
            device_id: "device-B".to_string(),
            hosts: vec!["192.168.1.4".to_string(), "10.0.0.7".to_string()],
            port: 13129,
        };
        storage.save_peer(&peer).unwrap();
        assert_eq!(storage.load_peer("device-B").unwrap(), Some(peer));

        storage.promote_peer_host("device-B", "10.0.0.7").unwrap();
        let promoted = storage.load_peer("device-B").unwrap().unwrap();
        assert_eq!(promoted.hosts, vec!["10.0.0.7", "192.168.1.4"]);

        assert_eq!(storage.list_peers().unwrap().len(), 1);
        assert!(storage.load_peer("device-C").unwrap().is_none());
    }
}
