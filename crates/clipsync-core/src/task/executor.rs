//! Generic dispatch-and-record loop
//!
//! The executor knows nothing about individual task types. It moves a record
//! through the state machine around a call to whichever handler is
//! registered for the record's type.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{ClipSyncError, ClipSyncResult};
use crate::storage::Storage;
use crate::types::{Task, TaskId, TaskStatus};

use super::limiter::{ExecutionPools, TaskSemaphore};
use super::HandlerRegistry;

/// Dispatches task records to their handlers.
pub struct TaskExecutor {
    storage: Storage,
    registry: HandlerRegistry,
    pools: ExecutionPools,
    io_limit: usize,
    cpu_limit: usize,
}

impl TaskExecutor {
    /// Build an executor over a complete handler table.
    ///
    /// Batches of network-bound tasks run at most `io_limit` at a time; local
    /// work uses the same bound until [`TaskExecutor::with_cpu_limit`] sets
    /// its own.
    ///
    /// Fails with [`ClipSyncError::MissingHandler`] naming the first task
    /// type that has no handler.
    pub fn new(
        storage: Storage,
        registry: HandlerRegistry,
        pools: &ExecutionPools,
        io_limit: usize,
    ) -> ClipSyncResult<Self> {
        if let Some(task_type) = registry.missing().into_iter().next() {
            return Err(ClipSyncError::MissingHandler(task_type));
        }
        Ok(Self {
            storage,
            registry,
            pools: pools.clone(),
            io_limit,
            cpu_limit: io_limit,
        })
    }

    /// Bound for batches of local, CPU-bound tasks.
    pub fn with_cpu_limit(mut self, cpu_limit: usize) -> Self {
        self.cpu_limit = cpu_limit;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Run one task through `EXECUTING` to `SUCCESS` or `FAILURE`.
    ///
    /// A task whose record no longer exists is skipped. Handler failures are
    /// recorded on the task and never returned; an `Err` here means the task
    /// store itself failed.
    ///
    /// # Panics
    ///
    /// Panics if the task's type has no registered handler. [`TaskExecutor::new`]
    /// rejects such registries, so this only fires on a wiring defect.
    pub async fn execute(&self, task_id: &TaskId) -> ClipSyncResult<()> {
        let Some(task) = self.storage.mark_executing(task_id)? else {
            debug!(task_id = %task_id, "Task record gone, skipping");
            return Ok(());
        };

        let Some(handler) = self.registry.get(task.task_type) else {
            error!(task_id = %task_id, task_type = %task.task_type, "No handler registered");
            panic!("no handler registered for task type {}", task.task_type);
        };

        match handler.execute(&task).await {
            Ok(()) => {
                self.storage.mark_success(task_id)?;
                debug!(task_id = %task_id, task_type = %task.task_type, "Task succeeded");
            }
            Err(e) => {
                warn!(task_id = %task_id, task_type = %task.task_type, error = %e, "Task failed");
                self.storage.mark_failure(task_id, &e.to_string())?;
            }
        }
        Ok(())
    }

    /// Dispatch a batch of tasks on the I/O pool, at most `io_limit` at a
    /// time.
    ///
    /// Permits belong to this call alone; concurrent batches never compete
    /// for them.
    pub async fn execute_batch(self: &Arc<Self>, task_ids: Vec<TaskId>) -> ClipSyncResult<()> {
        self.run_batch(self.pools.io_limiter(self.io_limit), task_ids)
            .await
    }

    async fn run_batch(
        self: &Arc<Self>,
        limiter: TaskSemaphore,
        task_ids: Vec<TaskId>,
    ) -> ClipSyncResult<()> {
        let work: Vec<_> = task_ids
            .into_iter()
            .map(|task_id| {
                let executor = Arc::clone(self);
                move || async move { executor.execute(&task_id).await }
            })
            .collect();
        limiter.run_bounded(work).await?;
        Ok(())
    }

    /// Dispatch every task currently in `PREPARING`.
    ///
    /// Network-bound tasks run on the I/O pool and local work on the CPU
    /// pool, each batch under its own limit. Returns the number of tasks
    /// dispatched.
    pub async fn drive_pending(self: &Arc<Self>) -> ClipSyncResult<usize> {
        let (io, cpu): (Vec<Task>, Vec<Task>) = self
            .storage
            .list_tasks_by_status(TaskStatus::Preparing)?
            .into_iter()
            .partition(|task| task.task_type.is_io_bound());
        let count = io.len() + cpu.len();
        if count == 0 {
            return Ok(0);
        }

        debug!(io = io.len(), cpu = cpu.len(), "Driving pending tasks");
        let ids = |tasks: Vec<Task>| -> Vec<TaskId> {
            tasks.into_iter().map(|task| task.task_id).collect()
        };
        tokio::try_join!(
            self.run_batch(self.pools.io_limiter(self.io_limit), ids(io)),
            self.run_batch(self.pools.cpu_limiter(self.cpu_limit), ids(cpu)),
        )?;
        Ok(count)
    }
}
