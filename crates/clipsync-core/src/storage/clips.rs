//! Clip Storage - locally stored clips keyed by clip id
//!
//! Only the fields the task handlers touch live here; formatting of clip
//! bodies is left to the clipboard layer.

use crate::error::ClipSyncError;
use crate::types::{ClipRecord, Task, TaskExtraInfo, TaskType};
use redb::{ReadableTable, TableDefinition};

use super::{Storage, TASKS_TABLE};

/// Table for clips (key: clip id, value: serialized ClipRecord)
pub(crate) const CLIPS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("clips");

impl Storage {
    /// Save a clip, overwriting any clip with the same id.
    pub fn save_clip(&self, clip: &ClipRecord) -> Result<(), ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let mut table = write_txn.open_table(CLIPS_TABLE)?;
            let serialized = postcard::to_allocvec(clip)
                .map_err(|e| ClipSyncError::Serialization(e.to_string()))?;
            table.insert(clip.clip_id, serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a clip by id.
    pub fn load_clip(&self, clip_id: u64) -> Result<Option<ClipRecord>, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(CLIPS_TABLE)?;

        if let Some(data) = table.get(clip_id)? {
            let clip: ClipRecord = postcard::from_bytes(data.value())
                .map_err(|e| ClipSyncError::Serialization(e.to_string()))?;
            Ok(Some(clip))
        } else {
            Ok(None)
        }
    }

    /// List all clips ordered by clip id.
    pub fn list_clips(&self) -> Result<Vec<ClipRecord>, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(CLIPS_TABLE)?;

        let mut clips = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let clip: ClipRecord = postcard::from_bytes(value.value())
                .map_err(|e| ClipSyncError::Serialization(e.to_string()))?;
            clips.push(clip);
        }
        Ok(clips)
    }

    /// Record that `clip_id` now lives on `device_id`.
    ///
    /// Returns `false` if the clip no longer exists.
    pub fn add_clip_remote_peer(&self, clip_id: u64, device_id: &str) -> Result<bool, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let found = {
            let mut table = write_txn.open_table(CLIPS_TABLE)?;
            let existing = table.get(clip_id)?.map(|v| v.value().to_vec());
            match existing {
                Some(bytes) => {
                    let mut clip: ClipRecord = postcard::from_bytes(&bytes)
                        .map_err(|e| ClipSyncError::Serialization(e.to_string()))?;
                    if !clip.remote_peers.iter().any(|p| p == device_id) {
                        clip.remote_peers.push(device_id.to_string());
                    }
                    let serialized = postcard::to_allocvec(&clip)
                        .map_err(|e| ClipSyncError::Serialization(e.to_string()))?;
                    table.insert(clip_id, serialized.as_slice())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(found)
    }

    /// Delete a set of clips and create `follow_ons` in the same transaction.
    ///
    /// Either the clips are gone and every follow-on task exists, or nothing
    /// changed.
    pub fn delete_clips_with_follow_ons(
        &self,
        clip_ids: &[u64],
        follow_ons: Vec<(TaskType, TaskExtraInfo)>,
    ) -> Result<Vec<Task>, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let created = {
            let mut clips = write_txn.open_table(CLIPS_TABLE)?;
            for clip_id in clip_ids {
                clips.remove(*clip_id)?;
            }
            let mut tasks = write_txn.open_table(TASKS_TABLE)?;
            let mut created = Vec::with_capacity(follow_ons.len());
            for (task_type, extra_info) in follow_ons {
                created.push(self.insert_new_task(&mut tasks, task_type, Some(extra_info))?);
            }
            created
        };
        write_txn.commit()?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn clip(clip_id: u64, created_at: i64) -> ClipRecord {
        ClipRecord {
            clip_id,
            created_at,
            content: b"hello".to_vec(),
            file_names: Vec::new(),
            remote_peers: Vec::new(),
        }
    }

    #[test]
    fn test_save_and_load_clip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb")).unwrap();

        storage.save_clip(&clip(42, 1_000)).unwrap();
        assert_eq!(storage.load_clip(42).unwrap(), Some(clip(42, 1_000)));
        assert!(storage.load_clip(7).unwrap().is_none());
    }

    #[test]
    fn test_add_remote_peer_deduplicates() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb")).unwrap();
        storage.save_clip(&clip(1, 0)).unwrap();

        assert!(storage.add_clip_remote_peer(1, "device-B").unwrap());
        assert!(storage.add_clip_remote_peer(1, "device-B").unwrap());
        assert!(!storage.add_clip_remote_peer(2, "device-B").unwrap());

        let loaded = storage.load_clip(1).unwrap().unwrap();
        assert_eq!(loaded.remote_peers, vec!["device-B".to_string()]);
    }

    #[test]
    fn test_delete_clips_with_follow_ons() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb")).unwrap();
        for id in 1..=3 {
            storage.save_clip(&clip(id, 0)).unwrap();
        }

        let created = storage
            .delete_clips_with_follow_ons(
                &[1, 3],
                vec![(
                    TaskType::DeleteRemoteClip,
                    TaskExtraInfo::delete_remote_clip("device-B", 1),
                )],
            )
            .unwrap();
        let remaining: Vec<u64> = storage.list_clips().unwrap().iter().map(|c| c.clip_id).collect();
        assert_eq!(remaining, vec![2]);

        assert_eq!(created.len(), 1);
        assert_eq!(storage.list_tasks().unwrap(), created);
    }

    #[test]
    fn test_delete_clips_without_follow_ons() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb")).unwrap();
        storage.save_clip(&clip(1, 0)).unwrap();

        assert!(storage
            .delete_clips_with_follow_ons(&[1, 99], Vec::new())
            .unwrap()
            .is_empty());
        assert!(storage.list_clips().unwrap().is_empty());
        assert!(storage.list_tasks().unwrap().is_empty());
    }
}
