use async_trait::async_trait;
use tracing::info;

use crate::task::{HandlerError, TaskHandler};
use crate::types::{Task, TaskExtraInfo, TaskType};

use super::PeerLink;

/// Asks a peer to drop a clip it previously received from us.
pub struct DeleteRemoteClipHandler {
    link: PeerLink,
}

impl DeleteRemoteClipHandler {
    pub fn new(link: PeerLink) -> Self {
        Self { link }
    }
}

#[async_trait]
impl TaskHandler for DeleteRemoteClipHandler {
    fn task_type(&self) -> TaskType {
        TaskType::DeleteRemoteClip
    }

    async fn execute(&self, task: &Task) -> Result<(), HandlerError> {
        let Some(TaskExtraInfo::DeleteRemoteClip { peer, clip_id, .. }) = &task.extra_info else {
            return Err(HandlerError::InvalidPayload(self.task_type()));
        };

        let (host, port) = self.link.reach(peer).await?;
        self.link
            .transport()
            .delete_clip(&host, port, *clip_id)
            .await
            .map_err(|e| HandlerError::Transfer(e.to_string()))?;

        info!(clip_id, peer = %peer, "Deleted clip on peer");
        Ok(())
    }
}
