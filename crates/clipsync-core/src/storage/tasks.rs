//! Task Storage - the task table and its state machine transitions
//!
//! Every transition runs inside one redb write transaction: the new status
//! and `modify_time` either commit together or not at all. redb admits one
//! writer at a time, so transitions on the same task are serialized by the
//! store itself.

use crate::error::ClipSyncError;
use crate::types::{merge_failure, Task, TaskExtraInfo, TaskId, TaskStatus, TaskType};
use redb::{ReadableTable, Table, TableDefinition};

use super::Storage;

/// Table for task records (key: ULID string, value: serialized Task)
pub(crate) const TASKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

fn encode(task: &Task) -> Result<Vec<u8>, ClipSyncError> {
    postcard::to_allocvec(task).map_err(|e| ClipSyncError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Task, ClipSyncError> {
    postcard::from_bytes(bytes).map_err(|e| ClipSyncError::Serialization(e.to_string()))
}

impl Storage {
    // ═══════════════════════════════════════════════════════════════════════
    // Task CRUD
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a new task in `PREPARING`.
    pub fn create_task(
        &self,
        task_type: TaskType,
        extra_info: Option<TaskExtraInfo>,
    ) -> Result<Task, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let task = {
            let mut table = write_txn.open_table(TASKS_TABLE)?;
            self.insert_new_task(&mut table, task_type, extra_info)?
        };
        write_txn.commit()?;
        tracing::debug!(task_id = %task.task_id, task_type = %task.task_type, "Created task");
        Ok(task)
    }

    /// Create a follow-on task on behalf of `parent`, at most once.
    ///
    /// `claim` sees the stored parent and the id the follow-on will get. It
    /// records the follow-on on the parent and returns `true`, or returns
    /// `false` if the parent already spawned one. Parent update and follow-on
    /// insert commit together. Returns `None` when nothing was created,
    /// including when the parent no longer exists.
    pub fn create_follow_on(
        &self,
        parent: &TaskId,
        task_type: TaskType,
        extra_info: Option<TaskExtraInfo>,
        claim: impl FnOnce(&mut Task, &TaskId) -> bool,
    ) -> Result<Option<Task>, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let created = {
            let mut table = write_txn.open_table(TASKS_TABLE)?;
            let key = parent.to_key();
            let existing = table.get(key.as_str())?.map(|v| v.value().to_vec());
            match existing {
                Some(bytes) => {
                    let mut parent_task = decode(&bytes)?;
                    let now = self.now_millis();
                    let follow_on_id = TaskId::at(now);
                    if claim(&mut parent_task, &follow_on_id) {
                        parent_task.modify_time = now;
                        table.insert(key.as_str(), encode(&parent_task)?.as_slice())?;
                        let task = Task {
                            task_id: follow_on_id,
                            task_type,
                            status: TaskStatus::Preparing,
                            extra_info,
                            create_time: now,
                            modify_time: now,
                        };
                        let child_key = task.task_id.to_key();
                        table.insert(child_key.as_str(), encode(&task)?.as_slice())?;
                        Some(task)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        match created {
            Some(task) => {
                write_txn.commit()?;
                tracing::debug!(
                    parent = %parent,
                    task_id = %task.task_id,
                    task_type = %task.task_type,
                    "Created follow-on task"
                );
                Ok(Some(task))
            }
            None => {
                write_txn.abort()?;
                Ok(None)
            }
        }
    }

    /// Insert a fresh `PREPARING` task inside an open write transaction.
    pub(crate) fn insert_new_task(
        &self,
        table: &mut Table<'_, &'static str, &'static [u8]>,
        task_type: TaskType,
        extra_info: Option<TaskExtraInfo>,
    ) -> Result<Task, ClipSyncError> {
        let now = self.now_millis();
        let task = Task {
            task_id: TaskId::at(now),
            task_type,
            status: TaskStatus::Preparing,
            extra_info,
            create_time: now,
            modify_time: now,
        };
        let key = task.task_id.to_key();
        table.insert(key.as_str(), encode(&task)?.as_slice())?;
        Ok(task)
    }

    /// Load a task by ID.
    ///
    /// Returns `None` if no task with the given ID exists.
    pub fn load_task(&self, task_id: &TaskId) -> Result<Option<Task>, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(TASKS_TABLE)?;

        let key = task_id.to_key();
        match table.get(key.as_str())? {
            Some(v) => Ok(Some(decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// List all tasks, oldest first.
    pub fn list_tasks(&self) -> Result<Vec<Task>, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(TASKS_TABLE)?;

        // ULID keys iterate in creation order
        let mut tasks = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            tasks.push(decode(value.value())?);
        }
        Ok(tasks)
    }

    /// List tasks currently in `status`, oldest first.
    pub fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, ClipSyncError> {
        Ok(self
            .list_tasks()?
            .into_iter()
            .filter(|task| task.status == status)
            .collect())
    }

    /// Delete a task record.
    ///
    /// Returns `true` if a record was removed.
    pub fn delete_task(&self, task_id: &TaskId) -> Result<bool, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TASKS_TABLE)?;
            let key = task_id.to_key();
            let removed = table.remove(key.as_str())?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // State Machine Transitions
    // ═══════════════════════════════════════════════════════════════════════

    /// Move a task to `EXECUTING` and return the updated record.
    ///
    /// Returns `None` if the task does not exist (it may have been deleted).
    pub fn mark_executing(&self, task_id: &TaskId) -> Result<Option<Task>, ClipSyncError> {
        self.transition(task_id, |task| task.status = TaskStatus::Executing)
    }

    /// Move a task to `SUCCESS`. A missing task is not an error.
    pub fn mark_success(&self, task_id: &TaskId) -> Result<(), ClipSyncError> {
        self.transition(task_id, |task| task.status = TaskStatus::Success)?;
        Ok(())
    }

    /// Move a task to `FAILURE`, merging `message` into its payload.
    pub fn mark_failure(
        &self,
        task_id: &TaskId,
        message: &str,
    ) -> Result<Option<Task>, ClipSyncError> {
        self.transition(task_id, |task| {
            task.status = TaskStatus::Failure;
            task.extra_info = Some(merge_failure(task.extra_info.take(), message));
        })
    }

    /// Move a task back to `PREPARING` so a later pass picks it up again.
    pub fn reset_task(&self, task_id: &TaskId) -> Result<Option<Task>, ClipSyncError> {
        self.transition(task_id, |task| task.status = TaskStatus::Preparing)
    }

    /// Read-modify-write a single task inside one write transaction,
    /// stamping `modify_time`.
    fn transition(
        &self,
        task_id: &TaskId,
        apply: impl FnOnce(&mut Task),
    ) -> Result<Option<Task>, ClipSyncError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(TASKS_TABLE)?;
            let key = task_id.to_key();
            let existing = table.get(key.as_str())?.map(|v| v.value().to_vec());
            match existing {
                Some(bytes) => {
                    let mut task = decode(&bytes)?;
                    apply(&mut task);
                    task.modify_time = self.now_millis();
                    table.insert(key.as_str(), encode(&task)?.as_slice())?;
                    Some(task)
                }
                None => None,
            }
        };
        match updated {
            Some(task) => {
                write_txn.commit()?;
                tracing::trace!(task_id = %task.task_id, status = %task.status, "Task transition");
                Ok(Some(task))
            }
            None => {
                write_txn.abort()?;
                Ok(None)
            }
        }
    }
}
