//! Bounded concurrency for homogeneous task batches
//!
//! At most `limit` items of a batch run at once, whatever the batch size.
//! Permits are taken in submission order, so an item never waits behind one
//! submitted after it.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Runtimes the limiter presets schedule onto, split by workload class.
#[derive(Clone, Debug)]
pub struct ExecutionPools {
    cpu: Handle,
    io: Handle,
}

impl ExecutionPools {
    pub fn new(cpu: Handle, io: Handle) -> Self {
        Self { cpu, io }
    }

    /// Both workload classes on the ambient runtime.
    ///
    /// Panics outside a tokio runtime.
    pub fn current() -> Self {
        let handle = Handle::current();
        Self {
            cpu: handle.clone(),
            io: handle,
        }
    }

    /// Limiter for CPU-bound work.
    pub fn cpu_limiter(&self, limit: usize) -> TaskSemaphore {
        TaskSemaphore::new(limit, self.cpu.clone())
    }

    /// Limiter for I/O-bound work.
    pub fn io_limiter(&self, limit: usize) -> TaskSemaphore {
        TaskSemaphore::new(limit, self.io.clone())
    }
}

/// Runs a batch of async work items with bounded concurrency.
pub struct TaskSemaphore {
    semaphore: Arc<Semaphore>,
    limit: usize,
    handle: Handle,
}

impl TaskSemaphore {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize, handle: Handle) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            handle,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every item, at most `limit` at a time, and return their outputs
    /// in input order.
    ///
    /// Every item is started and awaited even if an earlier one fails. When
    /// any item fails, the failure of the earliest-submitted failing item is
    /// returned once the whole batch has settled. A panicking item is
    /// re-raised after the batch settles.
    pub async fn run_bounded<T, E, F, Fut>(&self, tasks: Vec<F>) -> Result<Vec<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<JoinError> + Send + 'static,
    {
        let total = tasks.len();
        let mut running = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("limiter semaphore is never closed");
            let work = task();
            running.spawn_on(
                async move {
                    let output = work.await;
                    drop(permit);
                    (index, output)
                },
                &self.handle,
            );
        }

        let mut outputs: Vec<Option<Result<T, E>>> = (0..total).map(|_| None).collect();
        let mut panic = None;
        let mut cancelled = None;
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok((index, output)) => outputs[index] = Some(output),
                Err(e) if e.is_panic() => {
                    panic.get_or_insert(e.into_panic());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Bounded task was cancelled");
                    if cancelled.is_none() {
                        cancelled = Some(E::from(e));
                    }
                }
            }
        }

        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }

        let mut results = Vec::with_capacity(total);
        for output in outputs {
            match output {
                Some(Ok(value)) => results.push(value),
                Some(Err(e)) => return Err(e),
                // Only a cancelled task leaves its slot empty
                None => break,
            }
        }
        match cancelled {
            Some(e) if results.len() < total => Err(e),
            _ => Ok(results),
        }
    }
}
