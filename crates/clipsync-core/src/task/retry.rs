//! External re-drive of failed tasks
//!
//! The executor never retries on its own; a scheduled pass decides which
//! `FAILURE` records go back to `PREPARING`.

use tracing::info;

use crate::error::ClipSyncResult;
use crate::storage::Storage;
use crate::types::{TaskId, TaskStatus};

#[derive(Clone)]
pub struct RetryPolicy {
    storage: Storage,
}

impl RetryPolicy {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Reset up to `max` failed tasks, oldest first, and return their ids.
    pub fn redrive_failed(&self, max: usize) -> ClipSyncResult<Vec<TaskId>> {
        let mut reset = Vec::new();
        for task in self
            .storage
            .list_tasks_by_status(TaskStatus::Failure)?
            .into_iter()
            .take(max)
        {
            if self.storage.reset_task(&task.task_id)?.is_some() {
                reset.push(task.task_id);
            }
        }
        if !reset.is_empty() {
            info!(count = reset.len(), "Re-queued failed tasks");
        }
        Ok(reset)
    }
}
