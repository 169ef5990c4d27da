use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::storage::Storage;
use crate::task::{HandlerError, TaskHandler};
use crate::types::{Task, TaskExtraInfo, TaskType};

use super::PeerLink;

/// Follow-on pull tasks a failed pull may enqueue.
pub const MAX_PULL_RETRIES: u32 = 3;

/// Downloads a file referenced by a remote clip into `files/<clip_id>/`.
pub struct PullFileHandler {
    storage: Storage,
    link: PeerLink,
    files_dir: PathBuf,
}

impl PullFileHandler {
    pub fn new(storage: Storage, link: PeerLink, files_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            link,
            files_dir: files_dir.into(),
        }
    }

    fn target_path(&self, clip_id: u64, file_name: &str) -> Result<PathBuf, HandlerError> {
        // Only a bare file name may come from a peer
        if Path::new(file_name).file_name().and_then(|n| n.to_str()) != Some(file_name) {
            return Err(HandlerError::UnsafeFileName(file_name.to_string()));
        }
        Ok(self.files_dir.join(clip_id.to_string()).join(file_name))
    }

    async fn pull(
        &self,
        peer: &str,
        clip_id: u64,
        file_name: &str,
        target: &Path,
    ) -> Result<(), HandlerError> {
        let (host, port) = self.link.reach(peer).await?;
        let body = self
            .link
            .transport()
            .pull_file(&host, port, clip_id, file_name)
            .await
            .map_err(|e| HandlerError::Transfer(e.to_string()))?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut partial = target.as_os_str().to_owned();
        partial.push(".part");
        tokio::fs::write(&partial, &body).await?;
        tokio::fs::rename(&partial, target).await?;

        info!(clip_id, file_name, bytes = body.len(), "Pulled file from peer");
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for PullFileHandler {
    fn task_type(&self) -> TaskType {
        TaskType::PullFile
    }

    async fn execute(&self, task: &Task) -> Result<(), HandlerError> {
        let Some(TaskExtraInfo::PullFile {
            peer,
            clip_id,
            file_name,
            attempts,
            ..
        }) = &task.extra_info
        else {
            return Err(HandlerError::InvalidPayload(self.task_type()));
        };

        let target = self.target_path(*clip_id, file_name)?;
        let result = self.pull(peer, *clip_id, file_name, &target).await;

        // A re-driven task that already queued its follow-on must not queue
        // another, or a dead peer multiplies the chain on every pass.
        if result.is_err() && *attempts < MAX_PULL_RETRIES {
            let follow_on = TaskExtraInfo::PullFile {
                peer: peer.clone(),
                clip_id: *clip_id,
                file_name: file_name.clone(),
                attempts: attempts + 1,
                retry_task: None,
                fail_message: None,
            };
            let retry = self.storage.create_follow_on(
                &task.task_id,
                TaskType::PullFile,
                Some(follow_on),
                |stored, retry_id| match &mut stored.extra_info {
                    Some(TaskExtraInfo::PullFile { retry_task, .. }) if retry_task.is_none() => {
                        *retry_task = Some(*retry_id);
                        true
                    }
                    _ => false,
                },
            )?;
            match retry {
                Some(retry) => debug!(
                    task_id = %task.task_id,
                    retry_task_id = %retry.task_id,
                    attempt = attempts + 1,
                    "Enqueued pull retry"
                ),
                None => debug!(task_id = %task.task_id, "Pull retry already enqueued"),
            }
        }
        result
    }
}
