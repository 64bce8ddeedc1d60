//! BRIGADE - Bounded worker pools with isolated per-task context
//!
//! A worker-pool library that runs submitted tasks across a fixed set of
//! workers, either OS threads sharing the process's memory or child
//! processes with fully isolated memory, behind one submission API.
//! Results and failures are captured per task and delivered only when the
//! caller retrieves them.
//!
//! # Quick Start
//!
//! ```no_run
//! use brigade::prelude::*;
//!
//! let pool = ThreadPool::with_capacity(4).unwrap();
//!
//! // One task, one handle to its eventual outcome.
//! let handle = pool.spawn(|_scope| 2 + 2).unwrap();
//! assert_eq!(handle.join().unwrap(), 4);
//!
//! // Many tasks, outcomes in input order regardless of completion order.
//! let squares = pool
//!     .map(|_scope, n: u32| n * n, [1, 2, 3, 4])
//!     .unwrap()
//!     .join_all()
//!     .unwrap();
//! assert_eq!(squares, vec![1, 4, 9, 16]);
//! ```
//!
//! # Features
//!
//! - **Bounded Concurrency**: A fixed worker count caps parallelism; excess
//!   submissions queue in arrival order
//! - **Two Execution Models**: Thread-backed or process-backed workers
//!   behind the same API
//! - **Deferred Failures**: A panicking or crashing task fails its own
//!   handle at retrieval, never the submitting thread
//! - **Context Cells**: Declared defaults with per-task overrides, isolated
//!   between tasks even on a reused worker
//! - **Crash Containment**: A dying worker process costs one task; the
//!   slot is restaffed automatically
//! - **Stats**: Per-pool counters and latency percentiles (optional)

// Lint configuration
#![warn(missing_docs, missing_debug_implementations)]
#![allow(dead_code)] // During development

// Core modules - always available
pub mod config;
pub mod context;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod runtime;
pub mod stats;
pub mod timer;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder, ExecutionModel};
pub use context::{ContextCell, TaskScope};
pub use error::{Error, Result};
pub use pool::{Job, ProcessPool, TaskHandle, TaskState, ThreadPool, WorkerPool};
pub use runtime::{init, init_with_config, shutdown, spawn};
pub use timer::Timer;

#[cfg(test)]
mod tests {
    use super::*;

    // These exercise pools built directly, not the shared default pool,
    // so they stay independent of the runtime lifecycle test.
    #[test]
    fn test_spawn_and_join() {
        let pool = ThreadPool::with_capacity(2).unwrap();

        let handle = pool.spawn(|_| 40 + 2).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn test_map_squares() {
        let pool = ThreadPool::with_capacity(4).unwrap();

        let squares = pool
            .map(|_scope, n: u64| n * n, 0..10)
            .unwrap()
            .join_all()
            .unwrap();
        assert_eq!(squares, (0..10).map(|n| n * n).collect::<Vec<u64>>());
    }

    #[test]
    fn test_context_cell_default_without_override() {
        let pool = ThreadPool::with_capacity(1).unwrap();
        let cell = ContextCell::named("greeting", String::from("hello"));

        let reader = {
            let cell = cell.clone();
            pool.spawn(move |scope| cell.get(scope)).unwrap()
        };
        assert_eq!(reader.join().unwrap(), "hello");
    }
}
