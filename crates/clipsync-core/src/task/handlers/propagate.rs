use async_trait::async_trait;
use tracing::info;

use crate::error::ClipSyncError;
use crate::storage::Storage;
use crate::task::{HandlerError, TaskHandler};
use crate::types::{Task, TaskExtraInfo, TaskType};

use super::PeerLink;

/// Sends a local clip to one paired device.
pub struct PropagateClipHandler {
    storage: Storage,
    link: PeerLink,
}

impl PropagateClipHandler {
    pub fn new(storage: Storage, link: PeerLink) -> Self {
        Self { storage, link }
    }
}

#[async_trait]
impl TaskHandler for PropagateClipHandler {
    fn task_type(&self) -> TaskType {
        TaskType::PropagateClip
    }

    async fn execute(&self, task: &Task) -> Result<(), HandlerError> {
        let Some(TaskExtraInfo::PropagateClip { peer, clip_id, .. }) = &task.extra_info else {
            return Err(HandlerError::InvalidPayload(self.task_type()));
        };

        let clip = self
            .storage
            .load_clip(*clip_id)?
            .ok_or(ClipSyncError::ClipNotFound(*clip_id))?;

        let (host, port) = self.link.reach(peer).await?;
        self.link
            .transport()
            .send_clip(&host, port, &clip)
            .await
            .map_err(|e| HandlerError::Transfer(e.to_string()))?;

        self.storage.add_clip_remote_peer(*clip_id, peer)?;
        info!(clip_id, peer = %peer, host = %host, "Propagated clip");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::handlers::testing::{fixture, Call};
    use crate::types::{ClipRecord, TaskStatus};

    fn task(extra_info: TaskExtraInfo) -> Task {
        Task {
            task_id: crate::types::TaskId::new(),
            task_type: TaskType::PropagateClip,
            status: TaskStatus::Executing,
            extra_info: Some(extra_info),
            create_time: 0,
            modify_time: 0,
        }
    }

    #[tokio::test]
    async fn test_sends_to_reachable_host_and_records_peer() {
        let fx = fixture();
        fx.storage
            .save_clip(&ClipRecord {
                clip_id: 42,
                created_at: 1,
                content: b"copied text".to_vec(),
                file_names: Vec::new(),
                remote_peers: Vec::new(),
            })
            .unwrap();
        let handler = PropagateClipHandler::new(fx.storage.clone(), fx.link.clone());

        handler
            .execute(&task(TaskExtraInfo::propagate_clip("device-B", 42)))
            .await
            .unwrap();

        assert_eq!(
            *fx.transport.calls.lock(),
            vec![Call::Send {
                host: "192.168.1.20".to_string(),
                clip_id: 42
            }]
        );
        let clip = fx.storage.load_clip(42).unwrap().unwrap();
        assert_eq!(clip.remote_peers, vec!["device-B"]);
    }

    #[tokio::test]
    async fn test_missing_clip_fails_before_probing() {
        let fx = fixture();
        let handler = PropagateClipHandler::new(fx.storage.clone(), fx.link.clone());

        let err = handler
            .execute(&task(TaskExtraInfo::propagate_clip("device-B", 7)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Clip not found: 7");
        assert!(fx.transport.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_foreign_payload() {
        let fx = fixture();
        let handler = PropagateClipHandler::new(fx.storage.clone(), fx.link.clone());

        let err = handler
            .execute(&task(TaskExtraInfo::purge_stale_clips(30, 10)))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidPayload(TaskType::PropagateClip)));
    }
}
