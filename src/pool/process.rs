//! Process-backed worker pool.
//!
//! Each worker slot is a child process running the current executable
//! with [`WORKER_ENV`] set, plus one pump thread in the parent that feeds
//! it [`wire`] frames over stdin/stdout. Jobs are encoded at submission,
//! so a value that cannot cross the boundary fails the `submit` call
//! itself; everything after that is deferred to the task's handle. A
//! worker that dies mid-task costs exactly that task and the slot is
//! restaffed with a fresh child.

use std::fmt;
use std::io::{self, BufReader, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{Config, ExecutionModel};
use crate::context::TaskScope;
use crate::error::{Error, Result};
use crate::stats::{PoolStats, StatsSnapshot};

use super::task::{MapResults, TaskCell, TaskHandle, TaskId};
use super::wire::{self, Outcome, Reply, Request};
use super::worker::panic_message;
use super::Job;

/// Environment marker present in spawned worker children. Its value is
/// the [`Job::kind`] the child should serve.
pub(crate) const WORKER_ENV: &str = "BRIGADE_WORKER_KIND";

// Pre-encoded request paired with the handle cell it fulfills.
struct ProcessEnvelope<T> {
    cell: Arc<TaskCell<T>>,
    frame: Vec<u8>,
}

#[derive(Debug)]
struct PumpHandle {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

/// Fixed-size pool of worker processes serving jobs of type `J`.
///
/// Jobs and their outputs cross the process boundary as CBOR, so `J`
/// must serialize and `J::Output` must deserialize. The binary that
/// constructs this pool must call [`init_worker`] for `J` at the top of
/// `main`, before any other work; the spawned children re-enter through
/// it.
///
/// Workers hold no shared memory: a context value or global mutated in
/// one task is invisible to every other worker, and a child that exits
/// or crashes takes only its in-flight task with it.
///
/// The framed channel runs over the child's stdin and stdout. Job code
/// executing in a worker must therefore never write to stdout; a stray
/// `println!` corrupts the frame stream and gets the worker declared
/// lost. The child's stderr is inherited from the parent and stays free
/// for diagnostics.
pub struct ProcessPool<J: Job> {
    queue: Option<Sender<ProcessEnvelope<J::Output>>>,
    drain: Receiver<ProcessEnvelope<J::Output>>,
    pumps: Vec<PumpHandle>,
    shutdown_now: Arc<AtomicBool>,
    stats: Arc<PoolStats>,
    capacity: usize,
}

impl<J> ProcessPool<J>
where
    J: Job + Serialize,
    J::Output: DeserializeOwned,
{
    /// Build a pool sized and named by `config`, spawning every worker
    /// child up front. A child that cannot be spawned fails construction.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let capacity = config.worker_count();
        let kind = J::kind();

        let (tx, rx) = crossbeam_channel::unbounded::<ProcessEnvelope<J::Output>>();
        let shutdown_now = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PoolStats::new());

        // On any early return the children spawned so far are reaped by
        // their drop glue.
        let mut children = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            children.push(WorkerProcess::spawn(kind)?);
        }

        let mut pumps = Vec::with_capacity(capacity);
        for (id, child) in children.into_iter().enumerate() {
            let queue = rx.clone();
            let shutdown_now = shutdown_now.clone();
            let name = format!("{}-pump-{}", config.worker_name_prefix, id);
            let thread = thread::Builder::new()
                .name(name)
                .spawn(move || pump_loop::<J::Output>(id, kind, child, queue, shutdown_now))
                .map_err(|e| Error::spawn(format!("pump thread {}: {}", id, e)))?;
            pumps.push(PumpHandle {
                id,
                thread: Some(thread),
            });
        }

        Ok(Self {
            queue: Some(tx),
            drain: rx,
            pumps,
            shutdown_now,
            stats,
            capacity,
        })
    }

    /// Pool with `workers` children and default settings otherwise.
    pub fn with_capacity(workers: usize) -> Result<Self> {
        let config = Config::builder()
            .workers(workers)
            .execution_model(ExecutionModel::Processes)
            .build()?;
        Self::new(&config)
    }

    /// Submit one job.
    ///
    /// The job is encoded here: [`Error::Serialization`] surfaces from
    /// this call, before anything is queued. Failures that happen later,
    /// in the worker, are delivered through the returned handle.
    pub fn submit(&self, job: J) -> Result<TaskHandle<J::Output>> {
        let queue = self.queue.as_ref().ok_or(Error::PoolClosed)?;
        let cell = TaskCell::new(self.stats.clone());
        let frame = wire::encode_frame(&Request {
            task: cell.id().as_u64(),
            job,
        })?;

        queue
            .send(ProcessEnvelope {
                cell: cell.clone(),
                frame,
            })
            .map_err(|_| Error::PoolClosed)?;
        self.stats.record_submitted();
        Ok(TaskHandle::new(cell))
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
}

// Lifecycle methods carry no serialization bounds so Drop can reach them.
impl<J: Job> ProcessPool<J> {
    /// Stop accepting work and wind the pool down. Idempotent.
    ///
    /// With `wait` true the call blocks until every already-submitted
    /// task has a terminal state and all worker children have exited.
    /// With `wait` false, queued tasks resolve as [`Error::Cancelled`],
    /// in-flight tasks finish in the background, and the detached pump
    /// threads reap their children afterwards.
    pub fn shutdown(&mut self, wait: bool) {
        match self.queue.take() {
            Some(sender) => drop(sender),
            None => return,
        }

        if wait {
            for pump in &mut self.pumps {
                if let Some(thread) = pump.thread.take() {
                    let _ = thread.join();
                }
            }
        } else {
            self.shutdown_now.store(true, Ordering::Release);
            for pump in &mut self.pumps {
                let _ = pump.thread.take();
            }
        }

        while let Ok(envelope) = self.drain.try_recv() {
            envelope.cell.cancel_admission();
        }
    }

    /// True once [`shutdown`](Self::shutdown) has run.
    pub fn is_closed(&self) -> bool {
        self.queue.is_none()
    }

    /// Number of worker processes, fixed for the pool's lifetime.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Point-in-time execution counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<J: Job> fmt::Debug for ProcessPool<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessPool")
            .field("capacity", &self.capacity)
            .field("closed", &self.queue.is_none())
            .finish()
    }
}

impl<J: Job> Drop for ProcessPool<J> {
    fn drop(&mut self) {
        self.shutdown(true);
    }
}

// One spawned worker child plus its framed stdio channel. Stdin sits
// behind an Option so a graceful shutdown can close it while the drop
// glue below still owns the child.
struct WorkerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    fn spawn(kind: &str) -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| Error::spawn(format!("current executable path: {}", e)))?;

        let mut child = Command::new(exe)
            .env(WORKER_ENV, kind)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::spawn(format!("worker process: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::spawn("worker stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| Error::spawn("worker stdout not captured"))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout,
        })
    }

    // Send one request frame and block for the matching reply frame.
    fn roundtrip(&mut self, frame: &[u8]) -> io::Result<Vec<u8>> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin closed"))?;
        stdin.write_all(frame)?;
        stdin.flush()?;
        match wire::read_frame_bytes(&mut self.stdout)? {
            Some(bytes) => Ok(bytes),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "worker process exited",
            )),
        }
    }

    // Close the pipe so the child sees end-of-input and exits on its
    // own, then reap it.
    fn shutdown(mut self) {
        let _ = self.stdin.take();
        let _ = self.child.wait();
    }
}

// Every other path reaps the child here. Kill and wait are both no-ops
// for a child that has already exited and been waited on.
impl Drop for WorkerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// Feeds one worker child from the shared queue. Owns the child for its
// whole tenure and replaces it if it dies mid-task.
fn pump_loop<T>(
    id: usize,
    kind: &'static str,
    mut child: WorkerProcess,
    queue: Receiver<ProcessEnvelope<T>>,
    shutdown_now: Arc<AtomicBool>,
) where
    T: DeserializeOwned + Send + 'static,
{
    while let Ok(envelope) = queue.recv() {
        if shutdown_now.load(Ordering::Acquire) {
            envelope.cell.cancel_admission();
            continue;
        }
        if !envelope.cell.start() {
            continue;
        }

        let reply_bytes = match child.roundtrip(&envelope.frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!("pump {}: worker process lost: {}", id, err);
                envelope.cell.fail(Error::worker_lost(err.to_string()));
                match WorkerProcess::spawn(kind) {
                    Ok(fresh) => {
                        // Assigning drops the dead child, which reaps it.
                        child = fresh;
                        continue;
                    }
                    Err(spawn_err) => {
                        tracing::error!("pump {}: cannot replace worker: {}", id, spawn_err);
                        break;
                    }
                }
            }
        };

        // The child consumed a whole frame, so the stream stays in sync
        // even when the reply itself does not decode.
        match wire::decode::<Reply<T>>(&reply_bytes) {
            Ok(reply) => match reply.outcome {
                Outcome::Ok(value) => envelope.cell.fulfill(value),
                Outcome::Panicked(message) => {
                    tracing::warn!(
                        "pump {}: task {} panicked in worker: {}",
                        id,
                        reply.task,
                        message
                    );
                    envelope.cell.fail(Error::task_failed(message));
                }
                Outcome::Fault(message) => envelope.cell.fail(Error::serialization(message)),
            },
            Err(err) => envelope.cell.fail(err),
        }
    }

    child.shutdown();
    tracing::trace!("pump {} exiting", id);
}

/// Turn the current process into a pool worker if it was spawned as one.
///
/// Call this at the top of `main` in any binary that constructs a
/// [`ProcessPool`]. In a worker child whose marker matches `J`'s
/// [`Job::kind`], it serves jobs over stdio until the parent closes the
/// pipe and then exits the process without returning. In every other
/// process it returns immediately. A binary hosting several job types
/// calls it once per type.
///
/// While serving, the process's stdout carries the reply frames, so job
/// code must route any output through stderr (`eprintln!`, or a
/// `tracing` subscriber writing there).
pub fn init_worker<J>()
where
    J: Job + DeserializeOwned,
    J::Output: Serialize,
{
    let kind = match std::env::var(WORKER_ENV) {
        Ok(kind) => kind,
        Err(_) => return,
    };
    if kind != J::kind() {
        return;
    }

    serve::<J>();
    std::process::exit(0);
}

// Request/reply loop on the child side of the pipe. One job at a time,
// each with a fresh scope; a panic in the job is captured and shipped
// back instead of unwinding the loop.
fn serve<J>()
where
    J: Job + DeserializeOwned,
    J::Output: Serialize,
{
    // The captured message travels back in the reply; keep the child's
    // stderr quiet.
    std::panic::set_hook(Box::new(|_| {}));

    let mut input = io::stdin().lock();
    let mut output = io::stdout().lock();

    loop {
        let bytes = match wire::read_frame_bytes(&mut input) {
            Ok(Some(bytes)) => bytes,
            Ok(None) | Err(_) => break,
        };
        let Request { task, job } = match wire::decode::<Request<J>>(&bytes) {
            Ok(request) => request,
            Err(_) => break,
        };

        let mut scope =
            TaskScope::for_task(TaskId::from_raw(task), Arc::new(AtomicBool::new(false)));
        let outcome = match catch_unwind(AssertUnwindSafe(|| job.run(&mut scope))) {
            Ok(value) => Outcome::Ok(value),
            Err(payload) => Outcome::Panicked(panic_message(payload)),
        };

        let reply = Reply { task, outcome };
        let frame = match wire::encode_frame(&reply) {
            Ok(frame) => frame,
            Err(err) => {
                // The value would not encode; tell the parent why.
                let fallback = Reply {
                    task,
                    outcome: Outcome::<J::Output>::Fault(err.to_string()),
                };
                match wire::encode_frame(&fallback) {
                    Ok(frame) => frame,
                    Err(_) => break,
                }
            }
        };

        if output.write_all(&frame).and_then(|_| output.flush()).is_err() {
            break;
        }
    }
}
