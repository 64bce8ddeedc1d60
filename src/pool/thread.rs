//! Thread-backed worker pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::config::Config;
use crate::context::TaskScope;
use crate::error::{Error, Result};
use crate::stats::{PoolStats, StatsSnapshot};

use super::task::{Envelope, MapResults, TaskCell, TaskHandle};
use super::worker::{self, WorkerHandle};
use super::Job;

/// Fixed-size pool of shared-memory worker threads.
///
/// Submissions enter an unbounded queue and are admitted to workers in
/// arrival order, so at most `capacity` tasks execute at once. Tasks share
/// the process's memory: nothing is serialized, and a panicking task is
/// caught at the worker boundary without disturbing its neighbors.
///
/// Dropping the pool is a graceful shutdown: the queue closes and every
/// already-submitted task runs to completion first.
#[derive(Debug)]
pub struct ThreadPool {
    queue: Option<Sender<Envelope>>,
    drain: Receiver<Envelope>,
    workers: Vec<WorkerHandle>,
    shutdown_now: Arc<AtomicBool>,
    stats: Arc<PoolStats>,
    capacity: usize,
}

impl ThreadPool {
    /// Build a pool sized and named by `config`.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let capacity = config.worker_count();

        let (tx, rx) = crossbeam_channel::unbounded::<Envelope>();
        let shutdown_now = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PoolStats::new());

        let mut workers = Vec::with_capacity(capacity);
        for id in 0..capacity {
            let name = format!("{}-{}", config.worker_name_prefix, id);
            workers.push(worker::spawn_worker(
                id,
                name,
                config.stack_size,
                rx.clone(),
                shutdown_now.clone(),
            )?);
        }

        Ok(Self {
            queue: Some(tx),
            drain: rx,
            workers,
            shutdown_now,
            stats,
            capacity,
        })
    }

    /// Pool with `workers` threads and default settings otherwise.
    pub fn with_capacity(workers: usize) -> Result<Self> {
        let config = Config::builder().workers(workers).build()?;
        Self::new(&config)
    }

    /// Submit a closure and get a handle to its eventual outcome.
    ///
    /// The closure receives the task's own [`TaskScope`], carrying its
    /// context bindings and cooperative cancellation flag. A panic inside
    /// the closure is captured and delivered through the handle as
    /// [`Error::TaskFailed`], never at this call.
    pub fn spawn<T, F>(&self, f: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut TaskScope) -> T + Send + 'static,
    {
        let queue = self.queue.as_ref().ok_or(Error::PoolClosed)?;
        let cell = TaskCell::new(self.stats.clone());
        let envelope = Envelope::new(&cell, f);

        queue.send(envelope).map_err(|_| Error::PoolClosed)?;
        self.stats.record_submitted();
        Ok(TaskHandle::new(cell))
    }

    /// Submit one [`Job`] value.
    pub fn submit<J: Job>(&self, job: J) -> Result<TaskHandle<J::Output>> {
        self.spawn(move |scope| job.run(scope))
    }

    /// Apply `f` to every input on the pool.
    ///
    /// All tasks are submitted up front; the returned [`MapResults`]
    /// yields outcomes in input order regardless of completion order.
    pub fn map<T, I, F>(&self, f: F, inputs: I) -> Result<MapResults<T>>
    where
        T: Send + 'static,
        I: IntoIterator,
        I::Item: Send + 'static,
        F: Fn(&mut TaskScope, I::Item) -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let handles = inputs
            .into_iter()
            .map(|input| {
                let f = f.clone();
                self.spawn(move |scope| f(scope, input))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MapResults::new(handles))
    }

    /// Stop accepting work and wind the pool down. Idempotent.
    ///
    /// With `wait` true the call blocks until every already-submitted task
    /// has finished. With `wait` false it returns immediately: queued
    /// tasks that never started resolve as [`Error::Cancelled`], tasks
    /// already on a worker run to completion in the background, and the
    /// worker threads are detached.
    pub fn shutdown(&mut self, wait: bool) {
        match self.queue.take() {
            // Closing the sender stops admission; workers drain what is
            // already queued and then see a closed channel.
            Some(sender) => drop(sender),
            None => return,
        }

        if wait {
            for worker in &mut self.workers {
                if let Some(thread) = worker.thread.take() {
                    let _ = thread.join();
                }
            }
        } else {
            self.shutdown_now.store(true, Ordering::Release);
            for worker in &mut self.workers {
                let _ = worker.thread.take();
            }
        }

        // Workers no longer receive; resolve anything left behind.
        while let Ok(envelope) = self.drain.try_recv() {
            envelope.abandon();
        }
    }

    /// True once [`shutdown`](Self::shutdown) has run.
    pub fn is_closed(&self) -> bool {
        self.queue.is_none()
    }

    /// Number of worker threads, fixed for the pool's lifetime.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Point-in-time execution counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown(true);
    }
}
