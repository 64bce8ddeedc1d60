//! Bounded worker pools over threads or processes.
//!
//! [`ThreadPool`] runs closures or [`Job`]s on shared-memory worker
//! threads. [`ProcessPool`] ships jobs to child worker processes and
//! brings the results back over a framed stdio channel. [`WorkerPool`]
//! wraps both behind the [`ExecutionModel`] configuration axis so the
//! choice of backing is a run-time decision.
//!
//! All three share the same admission discipline: submissions queue in
//! arrival order, at most `capacity` tasks run at once, and every outcome
//! is delivered through a [`TaskHandle`] when the caller asks for it.

pub mod process;
pub mod task;
pub mod thread;

mod wire;
mod worker;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{Config, ExecutionModel};
use crate::context::TaskScope;
use crate::error::Result;
use crate::stats::StatsSnapshot;

pub use process::{init_worker, ProcessPool};
pub use task::{MapResults, TaskHandle, TaskId, TaskState};
pub use thread::ThreadPool;

/// One unit of work: the callable and its arguments as a single value.
///
/// Thread pools accept any job. Process pools additionally require the
/// job and its output to serialize, since both cross a process boundary.
///
/// # Example
///
/// ```
/// use brigade::pool::{Job, ThreadPool};
/// use brigade::TaskScope;
///
/// struct Add(u32, u32);
///
/// impl Job for Add {
///     type Output = u32;
///
///     fn run(self, _scope: &mut TaskScope) -> u32 {
///         self.0 + self.1
///     }
/// }
///
/// let pool = ThreadPool::with_capacity(1).unwrap();
/// let handle = pool.submit(Add(2, 3)).unwrap();
/// assert_eq!(handle.join().unwrap(), 5);
/// ```
pub trait Job: Send + 'static {
    /// Value produced by a completed run.
    type Output: Send + 'static;

    /// Execute the job. `scope` carries the task's context bindings and
    /// cooperative cancellation flag.
    fn run(self, scope: &mut TaskScope) -> Self::Output;

    /// Discriminator used to route jobs to worker processes when one
    /// binary hosts several job types. Defaults to the type name.
    fn kind() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

enum Backend<J: Job> {
    Threads(ThreadPool),
    Processes(ProcessPool<J>),
}

/// Pool facade that picks its backend from [`Config::execution_model`].
///
/// Code written against this type runs unchanged on worker threads or
/// worker processes; only the configuration decides. The serialization
/// bounds of the process backend apply to both, which keeps the choice
/// honest: a job that cannot cross a process boundary is rejected at
/// compile time, not when someone flips the model in production.
pub struct WorkerPool<J: Job> {
    backend: Backend<J>,
}

impl<J> WorkerPool<J>
where
    J: Job + Serialize,
    J::Output: DeserializeOwned,
{
    /// Build a pool with the backend named by `config.execution_model`.
    pub fn new(config: &Config) -> Result<Self> {
        let backend = match config.execution_model {
            ExecutionModel::Threads => Backend::Threads(ThreadPool::new(config)?),
            ExecutionModel::Processes => Backend::Processes(ProcessPool::new(config)?),
        };
        Ok(Self { backend })
    }

    /// Submit one job. See [`ThreadPool::submit`] and
    /// [`ProcessPool::submit`] for the backend-specific failure points.
    pub fn submit(&self, job: J) -> Result<TaskHandle<J::Output>> {
        match &self.backend {
            Backend::Threads(pool) => pool.submit(job),
            Backend::Processes(pool) => pool.submit(job),
        }
    }

    /// Submit every job and collect handles in input order.
    pub fn map<I>(&self, jobs: I) -> Result<MapResults<J::Output>>
    where
        I: IntoIterator<Item = J>,
    {
        let handles = jobs
            .into_iter()
            .map(|job| self.submit(job))
            .collect::<Result<Vec<_>>>()?;
        Ok(MapResults::new(handles))
    }

    /// Stop accepting work and wind the pool down. Idempotent.
    pub fn shutdown(&mut self, wait: bool) {
        match &mut self.backend {
            Backend::Threads(pool) => pool.shutdown(wait),
            Backend::Processes(pool) => pool.shutdown(wait),
        }
    }

    /// Which backend this pool runs on.
    pub fn execution_model(&self) -> ExecutionModel {
        match &self.backend {
            Backend::Threads(_) => ExecutionModel::Threads,
            Backend::Processes(_) => ExecutionModel::Processes,
        }
    }

    /// Number of workers, fixed for the pool's lifetime.
    pub fn capacity(&self) -> usize {
        match &self.backend {
            Backend::Threads(pool) => pool.capacity(),
            Backend::Processes(pool) => pool.capacity(),
        }
    }

    /// Point-in-time execution counters.
    pub fn stats(&self) -> StatsSnapshot {
        match &self.backend {
            Backend::Threads(pool) => pool.stats(),
            Backend::Processes(pool) => pool.stats(),
        }
    }
}

impl<J: Job> fmt::Debug for WorkerPool<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = match self.backend {
            Backend::Threads(_) => ExecutionModel::Threads,
            Backend::Processes(_) => ExecutionModel::Processes,
        };
        f.debug_struct("WorkerPool")
            .field("execution_model", &model)
            .finish()
    }
}
