use async_trait::async_trait;
use tracing::info;

use crate::storage::Storage;
use crate::task::{HandlerError, TaskHandler};
use crate::types::{ClipRecord, Task, TaskExtraInfo, TaskType};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Drops local clips past the retention window or beyond the storage cap.
///
/// Every purged clip that was propagated gets a `DeleteRemoteClip` task per
/// peer it was sent to.
pub struct PurgeStaleClipsHandler {
    storage: Storage,
}

impl PurgeStaleClipsHandler {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

/// Clips to purge: everything created before `cutoff`, then the oldest of
/// the rest until at most `max_clips` remain.
fn select_stale(mut clips: Vec<ClipRecord>, cutoff: i64, max_clips: usize) -> Vec<ClipRecord> {
    clips.sort_by_key(|clip| (clip.created_at, clip.clip_id));
    let (mut stale, fresh): (Vec<_>, Vec<_>) =
        clips.into_iter().partition(|clip| clip.created_at < cutoff);
    let excess = fresh.len().saturating_sub(max_clips);
    stale.extend(fresh.into_iter().take(excess));
    stale
}

#[async_trait]
impl TaskHandler for PurgeStaleClipsHandler {
    fn task_type(&self) -> TaskType {
        TaskType::PurgeStaleClips
    }

    async fn execute(&self, task: &Task) -> Result<(), HandlerError> {
        let Some(TaskExtraInfo::PurgeStaleClips {
            retention_days,
            max_clips,
            ..
        }) = &task.extra_info
        else {
            return Err(HandlerError::InvalidPayload(self.task_type()));
        };

        let cutoff =
            chrono::Utc::now().timestamp_millis() - i64::from(*retention_days) * MILLIS_PER_DAY;
        let stale = select_stale(self.storage.list_clips()?, cutoff, *max_clips);
        if stale.is_empty() {
            return Ok(());
        }

        let ids: Vec<u64> = stale.iter().map(|clip| clip.clip_id).collect();
        let follow_ons: Vec<_> = stale
            .iter()
            .flat_map(|clip| {
                clip.remote_peers.iter().map(|peer| {
                    (
                        TaskType::DeleteRemoteClip,
                        TaskExtraInfo::delete_remote_clip(peer.clone(), clip.clip_id),
                    )
                })
            })
            .collect();
        let follow_ons = self
            .storage
            .delete_clips_with_follow_ons(&ids, follow_ons)?
            .len();

        info!(
            purged = ids.len(),
            remote_deletes = follow_ons,
            "Purged stale clips"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskId, TaskStatus};
    use tempfile::TempDir;

    fn clip(clip_id: u64, created_at: i64, remote_peers: &[&str]) -> ClipRecord {
        ClipRecord {
            clip_id,
            created_at,
            content: Vec::new(),
            file_names: Vec::new(),
            remote_peers: remote_peers.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_select_stale_applies_cutoff_then_cap() {
        let clips = vec![
            clip(1, 100, &[]),
            clip(2, 500, &[]),
            clip(3, 300, &[]),
            clip(4, 400, &[]),
            clip(5, 50, &[]),
        ];
        let stale: Vec<u64> = select_stale(clips, 200, 2)
            .into_iter()
            .map(|c| c.clip_id)
            .collect();
        // 5 and 1 are past the cutoff; of 3, 4, 2 the oldest goes to meet the cap.
        assert_eq!(stale, vec![5, 1, 3]);
    }

    #[tokio::test]
    async fn test_purge_deletes_and_enqueues_remote_deletes() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb")).unwrap();
        let now = chrono::Utc::now().timestamp_millis();

        storage
            .save_clip(&clip(1, now - 40 * MILLIS_PER_DAY, &["device-B", "device-C"]))
            .unwrap();
        storage.save_clip(&clip(2, now - 10 * MILLIS_PER_DAY, &[])).unwrap();
        storage.save_clip(&clip(3, now - 1000, &["device-B"])).unwrap();

        let handler = PurgeStaleClipsHandler::new(storage.clone());
        let task = Task {
            task_id: TaskId::new(),
            task_type: TaskType::PurgeStaleClips,
            status: TaskStatus::Executing,
            extra_info: Some(TaskExtraInfo::purge_stale_clips(30, 10)),
            create_time: 0,
            modify_time: 0,
        };
        handler.execute(&task).await.unwrap();

        let remaining: Vec<u64> = storage.list_clips().unwrap().iter().map(|c| c.clip_id).collect();
        assert_eq!(remaining, vec![2, 3]);

        let follow_ons: Vec<_> = storage
            .list_tasks()
            .unwrap()
            .into_iter()
            .map(|t| t.extra_info.unwrap())
            .collect();
        assert_eq!(
            follow_ons,
            vec![
                TaskExtraInfo::delete_remote_clip("device-B", 1),
                TaskExtraInfo::delete_remote_clip("device-C", 1),
            ]
        );

        // Second pass finds nothing to do
        handler.execute(&task).await.unwrap();
        assert_eq!(storage.list_tasks().unwrap().len(), 2);
    }
}
