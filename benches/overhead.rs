//! Benchmarks for submission and retrieval overhead on both backends

use criterion::{black_box, criterion_group, Criterion};
use serde::{Deserialize, Serialize};

use brigade::pool::{init_worker, Job, ProcessPool, ThreadPool};
use brigade::TaskScope;

#[derive(Debug, Serialize, Deserialize)]
struct FibJob {
    n: u64,
}

impl Job for FibJob {
    type Output = u64;

    fn run(self, _scope: &mut TaskScope) -> u64 {
        fib(self.n)
    }
}

fn fib(n: u64) -> u64 {
    if n < 2 {
        n
    } else {
        fib(n - 1) + fib(n - 2)
    }
}

fn bench_thread_pool(c: &mut Criterion) {
    let pool = ThreadPool::with_capacity(4).unwrap();
    let mut group = c.benchmark_group("thread_pool");

    group.bench_function("spawn_join", |b| {
        b.iter(|| {
            let handle = pool.spawn(|_| black_box(21u64) * 2).unwrap();
            black_box(handle.join().unwrap())
        });
    });

    group.bench_function("submit_join_job", |b| {
        b.iter(|| {
            let handle = pool.submit(FibJob { n: black_box(12) }).unwrap();
            black_box(handle.join().unwrap())
        });
    });

    group.bench_function("map_32", |b| {
        b.iter(|| {
            let results = pool
                .map(|_scope, n: u64| black_box(n) + 1, 0..32u64)
                .unwrap()
                .join_all()
                .unwrap();
            black_box(results)
        });
    });

    group.finish();
}

fn bench_process_pool(c: &mut Criterion) {
    let pool = ProcessPool::<FibJob>::with_capacity(2).unwrap();
    let mut group = c.benchmark_group("process_pool");
    // Every iteration crosses a process boundary twice; keep runs short.
    group.sample_size(20);

    group.bench_function("submit_join_job", |b| {
        b.iter(|| {
            let handle = pool.submit(FibJob { n: black_box(12) }).unwrap();
            black_box(handle.join().unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_thread_pool, bench_process_pool);

// Hand-written main instead of criterion_main!: the worker children
// spawned by the process benches re-execute this binary and must be
// diverted into serving before criterion parses arguments.
fn main() {
    init_worker::<FibJob>();

    benches();
    Criterion::default().configure_from_args().final_summary();
}
