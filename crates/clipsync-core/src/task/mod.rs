//! Asynchronous task pipeline
//!
//! Producers (clipboard changes, sync triggers, scheduled cleanup) create
//! task records in `PREPARING`. The [`TaskExecutor`] dispatches each record
//! to the handler registered for its type and records the outcome:
//!
//! ```text
//! PREPARING → EXECUTING → SUCCESS
//!                       → FAILURE ─(RetryPolicy::redrive_failed)→ PREPARING
//! ```
//!
//! The executor never retries on its own. Handlers may enqueue follow-on
//! tasks; that is invisible to the executor.

pub mod executor;
pub mod handlers;
pub mod limiter;
pub mod retry;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ClipSyncError;
use crate::types::{Task, TaskType};

pub use executor::TaskExecutor;
pub use limiter::{ExecutionPools, TaskSemaphore};
pub use retry::RetryPolicy;

/// Failure raised by a task handler.
///
/// The `Display` text is what ends up in the task's failure message.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// None of the peer's addresses answered a probe
    #[error("Peer {0} is not reachable")]
    Unreachable(String),

    /// The task payload does not belong to this handler
    #[error("Task payload does not match task type {0}")]
    InvalidPayload(TaskType),

    /// The peer rejected the request or the connection broke
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// A file name that would escape the clip's download directory
    #[error("Refusing unsafe file name {0:?}")]
    UnsafeFileName(String),

    #[error(transparent)]
    Store(#[from] ClipSyncError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Domain logic for one task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn execute(&self, task: &Task) -> Result<(), HandlerError>;
}

/// Immutable task-type → handler table, built once at startup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn get(&self, task_type: TaskType) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type)
    }

    /// Task types with no registered handler.
    pub fn missing(&self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|t| !self.handlers.contains_key(t))
            .collect()
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register a handler under its own task type, replacing any previous one.
    pub fn register(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(handler.task_type(), handler);
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}
