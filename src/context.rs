//! Per-task isolated context cells.
//!
//! A [`ContextCell`] is a handle to one named, defaulted value. The value a
//! task reads through the cell lives in that task's own [`TaskScope`], so two
//! tasks writing through the same cell never observe each other's writes,
//! even when they run back-to-back on the same reused worker. The scope is
//! created when a task starts and dropped when it finishes, which is what
//! keeps a binding from leaking into the next task on that worker.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::pool::TaskId;

/// Global cell ID counter
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a context cell; clones of a cell share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u64);

impl CellId {
    fn next() -> Self {
        CellId(CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to one per-task value with a fixed default.
///
/// The cell itself holds no task data. Reads and writes go through the
/// [`TaskScope`] of the executing task, keyed by the cell's identity.
#[derive(Debug, Clone)]
pub struct ContextCell<T> {
    id: CellId,
    name: Option<String>,
    default: T,
}

impl<T: Clone + Send + 'static> ContextCell<T> {
    /// Create an anonymous cell seeded with `default`.
    pub fn new(default: T) -> Self {
        Self {
            id: CellId::next(),
            name: None,
            default,
        }
    }

    /// Create a named cell; the name only shows up in diagnostics.
    pub fn named<S: Into<String>>(name: S, default: T) -> Self {
        Self {
            id: CellId::next(),
            name: Some(name.into()),
            default,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Value last written by this task through this cell, or the default.
    ///
    /// Reading before any write returns the default; it never fails.
    pub fn get(&self, scope: &TaskScope) -> T {
        match scope.lookup::<T>(self.id) {
            Some(value) => value.clone(),
            None => self.default.clone(),
        }
    }

    /// Bind `value` in the calling task's scope only.
    pub fn set(&self, scope: &mut TaskScope, value: T) {
        scope.bind(self.id, Box::new(value));
    }
}

/// One task's private bindings, created per execution and dropped after.
///
/// Workers hand a fresh scope to every task they run. Code outside a pool
/// can run jobs inline against a [`TaskScope::detached`] scope.
pub struct TaskScope {
    task: TaskId,
    cancelled: Option<Arc<AtomicBool>>,
    bindings: HashMap<CellId, Box<dyn Any + Send>>,
}

impl TaskScope {
    /// Scope for running a job outside any pool.
    pub fn detached() -> Self {
        Self {
            task: TaskId::DETACHED,
            cancelled: None,
            bindings: HashMap::new(),
        }
    }

    pub(crate) fn for_task(task: TaskId, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            task,
            cancelled: Some(cancelled),
            bindings: HashMap::new(),
        }
    }

    /// Identity of the task this scope belongs to.
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Cooperative cancellation flag; a long task can poll this and bail.
    ///
    /// Always false for detached scopes and for process-backed workers,
    /// where the flag does not cross the process boundary.
    pub fn is_cancelled(&self) -> bool {
        match &self.cancelled {
            Some(flag) => flag.load(Ordering::Relaxed),
            None => false,
        }
    }

    fn lookup<T: 'static>(&self, id: CellId) -> Option<&T> {
        self.bindings.get(&id).and_then(|v| v.downcast_ref::<T>())
    }

    fn bind(&mut self, id: CellId, value: Box<dyn Any + Send>) {
        self.bindings.insert(id, value);
    }
}

impl std::fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScope")
            .field("task", &self.task)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_until_set() {
        let cell = ContextCell::new(7u32);
        let mut scope = TaskScope::detached();

        assert_eq!(cell.get(&scope), 7);
        cell.set(&mut scope, 42);
        assert_eq!(cell.get(&scope), 42);
    }

    #[test]
    fn test_scopes_do_not_share_bindings() {
        let cell = ContextCell::named("depth", 0i64);
        let mut a = TaskScope::detached();
        let mut b = TaskScope::detached();

        cell.set(&mut a, 1);
        cell.set(&mut b, 2);

        assert_eq!(cell.get(&a), 1);
        assert_eq!(cell.get(&b), 2);
    }

    #[test]
    fn test_clone_keeps_identity() {
        let cell = ContextCell::new(String::from("unset"));
        let twin = cell.clone();
        let mut scope = TaskScope::detached();

        cell.set(&mut scope, String::from("written"));
        assert_eq!(twin.get(&scope), "written");
        assert_eq!(cell.id(), twin.id());
    }

    #[test]
    fn test_cells_are_independent() {
        let first = ContextCell::new(1u8);
        let second = ContextCell::new(1u8);
        let mut scope = TaskScope::detached();

        first.set(&mut scope, 9);
        assert_eq!(first.get(&scope), 9);
        assert_eq!(second.get(&scope), 1);
    }

    #[test]
    fn test_detached_scope_is_never_cancelled() {
        let scope = TaskScope::detached();
        assert!(!scope.is_cancelled());
        assert_eq!(scope.task_id(), TaskId::DETACHED);
    }
}
