//! Walkthrough of pool behavior: blocking work overlapping on worker
//! threads, CPU-bound work on threads versus processes, and per-task
//! context isolation against a shared mutable field.
//!
//! Run with `cargo run --example pool_demo`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use brigade::pool::{init_worker, Job, ProcessPool, ThreadPool};
use brigade::{ContextCell, TaskScope, Timer};

const COUNTDOWN_FROM: u64 = 200_000_000;

#[derive(Debug, Serialize, Deserialize)]
struct CountdownJob {
    from: u64,
}

impl Job for CountdownJob {
    type Output = u64;

    fn run(self, _scope: &mut TaskScope) -> u64 {
        countdown(self.from)
    }
}

fn countdown(from: u64) -> u64 {
    let mut n = from;
    while std::hint::black_box(n) > 0 {
        n -= 1;
    }
    from
}

fn main() {
    // Worker children re-enter here and never reach the demos below.
    init_worker::<CountdownJob>();

    tracing_subscriber::fmt().with_target(false).init();

    demo_blocking_overlap();
    demo_countdown_parallelism();
    demo_task_isolation();
}

// Five sleeps serially, then the same five across five workers. The
// pool version finishes in roughly one sleep's time: blocked workers
// cost nothing while they wait.
fn demo_blocking_overlap() {
    println!("--- blocking work ---");

    {
        let _timer = Timer::start("five sleeps back to back");
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(400));
        }
    }

    let pool = ThreadPool::with_capacity(5).unwrap();
    {
        let _timer = Timer::start("five sleeps across five workers");
        pool.map(
            |_scope, delay: Duration| thread::sleep(delay),
            [Duration::from_millis(400); 5],
        )
        .unwrap()
        .join_all()
        .unwrap();
    }
}

// The same CPU-bound countdown three ways.
fn demo_countdown_parallelism() {
    println!("--- cpu-bound work ---");

    {
        let _timer = Timer::start("five countdowns, one after another");
        for _ in 0..5 {
            countdown(COUNTDOWN_FROM);
        }
    }

    let threads = ThreadPool::with_capacity(5).unwrap();
    {
        let _timer = Timer::start("five countdowns on worker threads");
        threads
            .map(|_scope, from: u64| countdown(from), [COUNTDOWN_FROM; 5])
            .unwrap()
            .join_all()
            .unwrap();
    }

    let processes = ProcessPool::<CountdownJob>::with_capacity(5).unwrap();
    {
        let _timer = Timer::start("five countdowns on worker processes");
        processes
            .map((0..5).map(|_| CountdownJob {
                from: COUNTDOWN_FROM,
            }))
            .unwrap()
            .join_all()
            .unwrap();
    }
}

// Two tasks write "their" name into shared state, wait, and read it
// back. A plain shared field hands both tasks the last write; a context
// cell hands each task its own.
fn demo_task_isolation() {
    println!("--- task isolation ---");

    struct RacyGreeter {
        name: Mutex<String>,
    }

    impl RacyGreeter {
        fn set_then_read(&self, name: &str) -> String {
            *self.name.lock() = name.to_string();
            thread::sleep(Duration::from_millis(300));
            self.name.lock().clone()
        }
    }

    let pool = ThreadPool::with_capacity(2).unwrap();

    let racy = Arc::new(RacyGreeter {
        name: Mutex::new(String::new()),
    });
    let outcomes = pool
        .map(
            {
                let racy = racy.clone();
                move |_scope, name: &str| racy.set_then_read(name)
            },
            ["first", "second"],
        )
        .unwrap()
        .join_all()
        .unwrap();
    println!("shared field: {:?} (last writer wins for both)", outcomes);

    struct ScopedGreeter {
        name: ContextCell<String>,
    }

    impl ScopedGreeter {
        fn set_then_read(&self, scope: &mut TaskScope, name: &str) -> String {
            self.name.set(scope, name.to_string());
            thread::sleep(Duration::from_millis(300));
            self.name.get(scope)
        }
    }

    let scoped = Arc::new(ScopedGreeter {
        name: ContextCell::new(String::new()),
    });
    let outcomes = pool
        .map(
            {
                let scoped = scoped.clone();
                move |scope, name: &str| scoped.set_then_read(scope, name)
            },
            ["first", "second"],
        )
        .unwrap()
        .join_all()
        .unwrap();
    println!("context cell: {:?} (each task keeps its own)", outcomes);
}
