//! Process-wide default pool behind `init` / `spawn` / `shutdown`.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{Config, ExecutionModel};
use crate::context::TaskScope;
use crate::error::{Error, Result};
use crate::pool::{TaskHandle, ThreadPool};

// Global pool for the simple API
static DEFAULT_POOL: RwLock<Option<Arc<ThreadPool>>> = RwLock::new(None);

/// Initialize the default pool with default configuration.
pub fn init() -> Result<()> {
    init_with_config(Config::default())
}

/// Initialize the default pool.
///
/// Fails with [`Error::AlreadyInitialized`] if a default pool exists.
/// The default pool is always thread-backed; a process-backed
/// configuration is rejected here, since process pools are tied to one
/// job type and belong to an explicit
/// [`ProcessPool`](crate::pool::ProcessPool).
pub fn init_with_config(config: Config) -> Result<()> {
    if config.execution_model != ExecutionModel::Threads {
        return Err(Error::config(
            "the default pool is thread-backed; build a ProcessPool directly for process execution",
        ));
    }

    let mut slot = DEFAULT_POOL.write();
    if slot.is_some() {
        return Err(Error::AlreadyInitialized);
    }

    let pool = ThreadPool::new(&config)?;
    *slot = Some(Arc::new(pool));
    Ok(())
}

/// The default pool, if one is initialized.
pub fn default_pool() -> Result<Arc<ThreadPool>> {
    DEFAULT_POOL.read().clone().ok_or(Error::NotInitialized)
}

/// Submit a closure to the default pool.
pub fn spawn<T, F>(f: F) -> Result<TaskHandle<T>>
where
    T: Send + 'static,
    F: FnOnce(&mut TaskScope) -> T + Send + 'static,
{
    default_pool()?.spawn(f)
}

/// Tear down the default pool.
///
/// Already-submitted tasks run to completion; the pool's threads are
/// joined once the last outstanding reference to it is gone. A later
/// [`init`] builds a fresh pool.
pub fn shutdown() {
    let pool = DEFAULT_POOL.write().take();
    drop(pool);
}

#[cfg(test)]
mod tests {
    use super::*;

    // One sequential test: the default pool is process-wide state and
    // the test harness runs in parallel.
    #[test]
    fn test_default_pool_lifecycle() {
        shutdown();

        assert!(init().is_ok());
        assert!(matches!(init(), Err(Error::AlreadyInitialized)));

        let handle = spawn(|_| 21 * 2).unwrap();
        assert_eq!(handle.join().unwrap(), 42);

        shutdown();
        assert!(matches!(spawn(|_| ()), Err(Error::NotInitialized)));

        let config = Config::builder()
            .execution_model(ExecutionModel::Processes)
            .build()
            .unwrap();
        assert!(matches!(init_with_config(config), Err(Error::Config(_))));
    }
}
