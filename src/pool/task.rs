//! Task identity, lifecycle state, and result handles.
//!
//! Every submission creates one [`TaskCell`]: the shared slot a worker
//! fulfills and the caller's [`TaskHandle`] waits on. States move one way,
//! `Pending -> Running -> {Succeeded | Failed}` or `Pending -> Cancelled`,
//! and the payload is immutable once the task is terminal. A captured
//! failure stays in the slot until the caller retrieves it; nothing is
//! raised at submission time.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::context::TaskScope;
use crate::error::{Error, Result};
use crate::stats::PoolStats;

use super::worker::panic_message;

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a submitted task, monotonic in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Identity used by scopes that run outside any pool.
    pub const DETACHED: TaskId = TaskId(0);

    pub(crate) fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn from_raw(raw: u64) -> Self {
        TaskId(raw)
    }

    pub(crate) fn as_u64(self) -> u64 {
        self.0
    }
}

/// Lifecycle state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Queued, not yet admitted to a worker.
    Pending,
    /// Executing on a worker right now.
    Running,
    /// Finished and produced a value.
    Succeeded,
    /// Finished with a captured failure.
    Failed,
    /// Withdrawn before it ever occupied a worker slot.
    Cancelled,
}

impl TaskState {
    /// True once the state can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

enum Payload<T> {
    Empty,
    Value(T),
    Failure(Error),
    Taken,
}

struct Inner<T> {
    state: TaskState,
    payload: Payload<T>,
}

/// Shared slot between one task's worker and its handle.
pub(crate) struct TaskCell<T> {
    id: TaskId,
    inner: Mutex<Inner<T>>,
    done: Condvar,
    cancel_flag: Arc<AtomicBool>,
    stats: Arc<PoolStats>,
    submitted_at: Instant,
}

impl<T: Send + 'static> TaskCell<T> {
    pub(crate) fn new(stats: Arc<PoolStats>) -> Arc<Self> {
        Arc::new(Self {
            id: TaskId::next(),
            inner: Mutex::new(Inner {
                state: TaskState::Pending,
                payload: Payload::Empty,
            }),
            done: Condvar::new(),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            stats,
            submitted_at: Instant::now(),
        })
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// Admit the task: `Pending -> Running`. False if it was cancelled
    /// while queued, in which case the worker must not run it.
    pub(crate) fn start(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == TaskState::Pending {
            inner.state = TaskState::Running;
            self.stats.record_started();
            true
        } else {
            false
        }
    }

    pub(crate) fn fulfill(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.state = TaskState::Succeeded;
        inner.payload = Payload::Value(value);
        self.stats.record_completed(self.submitted_at.elapsed());
        drop(inner);
        self.done.notify_all();
    }

    pub(crate) fn fail(&self, error: Error) {
        let mut inner = self.inner.lock();
        inner.state = TaskState::Failed;
        inner.payload = Payload::Failure(error);
        self.stats.record_failed(self.submitted_at.elapsed());
        drop(inner);
        self.done.notify_all();
    }

    /// `Pending -> Cancelled`. True if this call performed the transition.
    pub(crate) fn cancel_admission(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == TaskState::Pending {
            inner.state = TaskState::Cancelled;
            self.stats.record_cancelled();
            drop(inner);
            self.done.notify_all();
            true
        } else {
            false
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    fn take(&self) -> Result<T> {
        let mut inner = self.inner.lock();
        while !inner.state.is_terminal() {
            self.done.wait(&mut inner);
        }
        Self::extract(&mut inner)
    }

    fn take_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            // A wait this long is unbounded in practice.
            None => return self.take(),
        };

        let mut inner = self.inner.lock();
        while !inner.state.is_terminal() {
            if self.done.wait_until(&mut inner, deadline).timed_out() {
                return Err(Error::Timeout);
            }
        }
        Self::extract(&mut inner)
    }

    fn try_take(&self) -> Option<Result<T>> {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            Some(Self::extract(&mut inner))
        } else {
            None
        }
    }

    // The payload moves out exactly once. Terminal with an empty payload
    // means the task was cancelled before producing anything.
    fn extract(inner: &mut Inner<T>) -> Result<T> {
        match std::mem::replace(&mut inner.payload, Payload::Taken) {
            Payload::Value(value) => Ok(value),
            Payload::Failure(error) => Err(error),
            Payload::Empty => Err(Error::Cancelled),
            Payload::Taken => Err(Error::Retrieved),
        }
    }
}

// Type-erased view of a cell, for shutdown drains over a mixed queue.
trait AdmissionControl: Send + Sync {
    fn cancel_admission(&self) -> bool;
}

impl<T: Send + 'static> AdmissionControl for TaskCell<T> {
    fn cancel_admission(&self) -> bool {
        TaskCell::cancel_admission(self)
    }
}

/// How one envelope execution ended, as seen by the worker loop.
pub(crate) enum Completion {
    Succeeded,
    Failed(String),
    /// Cancelled while queued; the task never ran.
    Skipped,
}

/// A queued unit of work for thread-backed pools: the erased job closure
/// plus enough of the cell to admit, skip, or abandon it.
pub(crate) struct Envelope {
    id: TaskId,
    cancel_flag: Arc<AtomicBool>,
    control: Arc<dyn AdmissionControl>,
    run: Box<dyn FnOnce(&mut TaskScope) -> Completion + Send>,
}

impl Envelope {
    pub(crate) fn new<T, F>(cell: &Arc<TaskCell<T>>, f: F) -> Self
    where
        T: Send + 'static,
        F: FnOnce(&mut TaskScope) -> T + Send + 'static,
    {
        let run_cell = cell.clone();
        let run = Box::new(move |scope: &mut TaskScope| {
            if !run_cell.start() {
                return Completion::Skipped;
            }
            match catch_unwind(AssertUnwindSafe(|| f(scope))) {
                Ok(value) => {
                    run_cell.fulfill(value);
                    Completion::Succeeded
                }
                Err(payload) => {
                    let message = panic_message(payload);
                    run_cell.fail(Error::task_failed(message.clone()));
                    Completion::Failed(message)
                }
            }
        });

        Self {
            id: cell.id(),
            cancel_flag: cell.cancel_flag(),
            control: cell.clone(),
            run,
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    /// Run the task with a scope of its own, dropped when it finishes.
    pub(crate) fn execute(self) -> Completion {
        let mut scope = TaskScope::for_task(self.id, self.cancel_flag.clone());
        (self.run)(&mut scope)
    }

    /// Resolve a never-started task as cancelled instead of running it.
    pub(crate) fn abandon(self) -> bool {
        self.control.cancel_admission()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope").field("id", &self.id).finish()
    }
}

/// Caller-side handle to one submitted task.
///
/// The handle is the only way to observe the task's outcome. A captured
/// failure is re-surfaced here, at retrieval, never at submission; an
/// unobserved failure is silently retained in the slot.
pub struct TaskHandle<T> {
    cell: Arc<TaskCell<T>>,
}

impl<T: Send + 'static> TaskHandle<T> {
    pub(crate) fn new(cell: Arc<TaskCell<T>>) -> Self {
        Self { cell }
    }

    /// Identity of the task, monotonic in submission order.
    pub fn id(&self) -> TaskId {
        self.cell.id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    /// True once the task is terminal, without blocking.
    pub fn is_finished(&self) -> bool {
        self.cell.state().is_terminal()
    }

    /// Block until the task is terminal and take its outcome.
    ///
    /// Returns the produced value, [`Error::TaskFailed`] with the captured
    /// failure, or [`Error::Cancelled`] for a task that never ran.
    pub fn join(self) -> Result<T> {
        self.cell.take()
    }

    /// Bounded wait for the outcome.
    ///
    /// [`Error::Timeout`] bounds only this call; the task itself keeps
    /// running and the handle stays usable for a later retry. After a
    /// successful retrieval the payload is gone and further calls return
    /// [`Error::Retrieved`].
    pub fn join_timeout(&mut self, timeout: Duration) -> Result<T> {
        self.cell.take_timeout(timeout)
    }

    /// Take the outcome if the task is already terminal.
    pub fn try_join(&mut self) -> Option<Result<T>> {
        self.cell.try_take()
    }

    /// Cancel the task if it has not started yet.
    ///
    /// Returns true when the task was still queued and is now
    /// [`TaskState::Cancelled`]. A task that is already running only has
    /// its cooperative flag raised, visible to the task through
    /// [`TaskScope::is_cancelled`]; it keeps running unless its own code
    /// checks the flag. The flag does not cross a process boundary.
    pub fn cancel(&self) -> bool {
        if self.cell.cancel_admission() {
            return true;
        }
        self.cell.cancel_flag.store(true, Ordering::Relaxed);
        false
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.cell.id)
            .field("state", &self.cell.inner.lock().state)
            .finish()
    }
}

/// Submission-ordered outcomes of a `map` call.
///
/// Iterating yields each task's outcome at its input position. The
/// iterator blocks until the task at the front is terminal, regardless of
/// the completion order of the tasks behind it, so a captured failure
/// surfaces exactly at the position of the input that caused it.
pub struct MapResults<T> {
    handles: std::vec::IntoIter<TaskHandle<T>>,
}

impl<T: Send + 'static> MapResults<T> {
    pub(crate) fn new(handles: Vec<TaskHandle<T>>) -> Self {
        Self {
            handles: handles.into_iter(),
        }
    }

    /// Block for every remaining outcome, stopping at the first failure.
    pub fn join_all(self) -> Result<Vec<T>> {
        self.collect()
    }
}

impl<T: Send + 'static> Iterator for MapResults<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.handles.next().map(TaskHandle::join)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.handles.size_hint()
    }
}

impl<T: Send + 'static> ExactSizeIterator for MapResults<T> {}

impl<T> fmt::Debug for MapResults<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapResults")
            .field("remaining", &self.handles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn cell<T: Send + 'static>() -> Arc<TaskCell<T>> {
        TaskCell::new(Arc::new(PoolStats::new()))
    }

    #[test]
    fn test_lifecycle_success() {
        let cell = cell::<u32>();
        assert_eq!(cell.state(), TaskState::Pending);
        assert!(cell.start());
        assert_eq!(cell.state(), TaskState::Running);

        cell.fulfill(9);
        let mut handle = TaskHandle::new(cell);
        assert!(handle.is_finished());
        assert_eq!(handle.state(), TaskState::Succeeded);
        assert_eq!(handle.join_timeout(Duration::from_millis(10)).unwrap(), 9);

        // The payload moves out exactly once.
        assert!(matches!(
            handle.join_timeout(Duration::from_millis(10)),
            Err(Error::Retrieved)
        ));
    }

    #[test]
    fn test_cancel_before_start() {
        let cell = cell::<u32>();
        let handle = TaskHandle::new(cell.clone());

        assert!(handle.cancel());
        assert_eq!(handle.state(), TaskState::Cancelled);
        // A worker picking the task up later must skip it.
        assert!(!cell.start());
        assert!(matches!(handle.join(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_cancel_running_is_advisory() {
        let cell = cell::<u32>();
        assert!(cell.start());
        let handle = TaskHandle::new(cell.clone());

        assert!(!handle.cancel());
        assert_eq!(handle.state(), TaskState::Running);
        assert!(cell.cancel_flag.load(Ordering::Relaxed));
    }

    #[test]
    fn test_join_timeout_leaves_task_running() {
        let cell = cell::<u32>();
        assert!(cell.start());
        let mut handle = TaskHandle::new(cell.clone());

        assert!(matches!(
            handle.join_timeout(Duration::from_millis(20)),
            Err(Error::Timeout)
        ));
        assert_eq!(handle.state(), TaskState::Running);

        let fulfiller = cell.clone();
        let waiter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            fulfiller.fulfill(5);
        });

        assert_eq!(handle.join_timeout(Duration::from_secs(2)).unwrap(), 5);
        waiter.join().unwrap();
    }

    #[test]
    fn test_failure_is_deferred_to_join() {
        let cell = cell::<u32>();
        assert!(cell.start());
        cell.fail(Error::task_failed("exploded"));

        let handle = TaskHandle::new(cell);
        match handle.join() {
            Err(Error::TaskFailed(message)) => assert!(message.contains("exploded")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_envelope_skips_cancelled_task() {
        let cell = cell::<u32>();
        let envelope = Envelope::new(&cell, |_| 1);
        let handle = TaskHandle::new(cell);

        assert!(handle.cancel());
        assert!(matches!(envelope.execute(), Completion::Skipped));
        assert_eq!(handle.state(), TaskState::Cancelled);
    }

    #[test]
    fn test_envelope_captures_panic() {
        let cell = cell::<u32>();
        let envelope = Envelope::new(&cell, |_| panic!("kaboom"));

        match envelope.execute() {
            Completion::Failed(message) => assert!(message.contains("kaboom")),
            _ => panic!("panic was not captured"),
        }
        assert_eq!(cell.state(), TaskState::Failed);
    }

    #[test]
    fn test_task_ids_are_monotonic() {
        let first = cell::<u32>();
        let second = cell::<u32>();
        assert!(second.id() > first.id());
        assert_ne!(first.id(), TaskId::DETACHED);
    }
}
