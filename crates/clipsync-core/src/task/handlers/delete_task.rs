use async_trait::async_trait;
use tracing::debug;

use crate::storage::Storage;
use crate::task::{HandlerError, TaskHandler};
use crate::types::{Task, TaskExtraInfo, TaskType};

/// Removes another task's record. The only way a task record is deleted.
pub struct DeleteTaskHandler {
    storage: Storage,
}

impl DeleteTaskHandler {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl TaskHandler for DeleteTaskHandler {
    fn task_type(&self) -> TaskType {
        TaskType::DeleteTask
    }

    async fn execute(&self, task: &Task) -> Result<(), HandlerError> {
        let Some(TaskExtraInfo::DeleteTask { target, .. }) = &task.extra_info else {
            return Err(HandlerError::InvalidPayload(self.task_type()));
        };

        let removed = self.storage.delete_task(target)?;
        debug!(task_id = %task.task_id, target = %target, removed, "Deleted task record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_deletes_target_only() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb")).unwrap();
        let target = storage.create_task(TaskType::PropagateClip, None).unwrap();
        storage.mark_success(&target.task_id).unwrap();
        let deleter = storage
            .create_task(
                TaskType::DeleteTask,
                Some(TaskExtraInfo::delete_task(target.task_id)),
            )
            .unwrap();

        let handler = DeleteTaskHandler::new(storage.clone());
        handler.execute(&deleter).await.unwrap();

        assert!(storage.load_task(&target.task_id).unwrap().is_none());
        assert!(storage.load_task(&deleter.task_id).unwrap().is_some());

        // Already gone is fine
        handler.execute(&deleter).await.unwrap();
    }
}
