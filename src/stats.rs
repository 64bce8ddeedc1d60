//! Pool execution counters and latency distribution.
//!
//! Compiled out when the `stats` feature is off: the same API remains,
//! recording becomes a no-op, and snapshots come back zeroed.

#[cfg(feature = "stats")]
mod imp {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, Instant};

    use hdrhistogram::Histogram;
    use parking_lot::RwLock;

    /// Live counters for one pool: totals per outcome, a running-task
    /// gauge with its high-water mark, and a submit-to-terminal latency
    /// histogram.
    #[derive(Debug)]
    pub struct PoolStats {
        submitted: AtomicU64,
        completed: AtomicU64,
        failed: AtomicU64,
        cancelled: AtomicU64,
        running: AtomicU64,
        running_peak: AtomicU64,
        latency: RwLock<Histogram<u64>>,
        started_at: Instant,
    }

    impl PoolStats {
        pub(crate) fn new() -> Self {
            // Nanosecond latencies up to one hour.
            let histogram = Histogram::new_with_max(3_600_000_000_000, 3)
                .expect("failed to create histogram");

            Self {
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                cancelled: AtomicU64::new(0),
                running: AtomicU64::new(0),
                running_peak: AtomicU64::new(0),
                latency: RwLock::new(histogram),
                started_at: Instant::now(),
            }
        }

        pub(crate) fn record_submitted(&self) {
            self.submitted.fetch_add(1, Ordering::Relaxed);
        }

        pub(crate) fn record_started(&self) {
            let now = self.running.fetch_add(1, Ordering::AcqRel) + 1;
            self.running_peak.fetch_max(now, Ordering::AcqRel);
        }

        pub(crate) fn record_completed(&self, latency: Duration) {
            self.completed.fetch_add(1, Ordering::Relaxed);
            self.running.fetch_sub(1, Ordering::AcqRel);
            self.record_latency(latency);
        }

        pub(crate) fn record_failed(&self, latency: Duration) {
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.running.fetch_sub(1, Ordering::AcqRel);
            self.record_latency(latency);
        }

        // Cancelled tasks never occupied a worker; the gauge is untouched.
        pub(crate) fn record_cancelled(&self) {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
        }

        fn record_latency(&self, latency: Duration) {
            // Skip the sample rather than stall a worker on the lock.
            if let Some(mut histogram) = self.latency.try_write() {
                let _ = histogram.record(latency.as_nanos() as u64);
            }
        }

        /// Consistent point-in-time view of every counter.
        pub fn snapshot(&self) -> StatsSnapshot {
            let histogram = self.latency.read();
            StatsSnapshot {
                uptime: self.started_at.elapsed(),
                submitted: self.submitted.load(Ordering::Relaxed),
                completed: self.completed.load(Ordering::Relaxed),
                failed: self.failed.load(Ordering::Relaxed),
                cancelled: self.cancelled.load(Ordering::Relaxed),
                running: self.running.load(Ordering::Relaxed),
                running_peak: self.running_peak.load(Ordering::Relaxed),
                avg_latency_ns: if histogram.len() > 0 {
                    histogram.mean() as u64
                } else {
                    0
                },
                p50_latency_ns: histogram.value_at_quantile(0.50),
                p95_latency_ns: histogram.value_at_quantile(0.95),
                p99_latency_ns: histogram.value_at_quantile(0.99),
                max_latency_ns: histogram.max(),
            }
        }
    }

    /// Frozen copy of a pool's counters.
    #[derive(Debug, Clone, Default)]
    pub struct StatsSnapshot {
        /// Time since the pool was built.
        pub uptime: Duration,
        /// Tasks accepted for execution.
        pub submitted: u64,
        /// Tasks that finished and produced a value.
        pub completed: u64,
        /// Tasks that finished with a captured failure.
        pub failed: u64,
        /// Tasks withdrawn before they ever ran.
        pub cancelled: u64,
        /// Tasks on a worker right now.
        pub running: u64,
        /// Most tasks ever on workers at once. Never exceeds the pool's
        /// capacity.
        pub running_peak: u64,
        /// Mean submit-to-terminal latency in nanoseconds.
        pub avg_latency_ns: u64,
        /// Median submit-to-terminal latency in nanoseconds.
        pub p50_latency_ns: u64,
        /// 95th percentile latency in nanoseconds.
        pub p95_latency_ns: u64,
        /// 99th percentile latency in nanoseconds.
        pub p99_latency_ns: u64,
        /// Worst observed latency in nanoseconds.
        pub max_latency_ns: u64,
    }
}

#[cfg(not(feature = "stats"))]
mod imp {
    use std::time::Duration;

    /// No-op collector compiled when the `stats` feature is off.
    #[derive(Debug)]
    pub struct PoolStats;

    impl PoolStats {
        pub(crate) fn new() -> Self {
            Self
        }

        pub(crate) fn record_submitted(&self) {}

        pub(crate) fn record_started(&self) {}

        pub(crate) fn record_completed(&self, _latency: Duration) {}

        pub(crate) fn record_failed(&self, _latency: Duration) {}

        pub(crate) fn record_cancelled(&self) {}

        /// Always the zero snapshot.
        pub fn snapshot(&self) -> StatsSnapshot {
            StatsSnapshot::default()
        }
    }

    /// Frozen copy of a pool's counters; all zero in this build.
    #[derive(Debug, Clone, Default)]
    pub struct StatsSnapshot {
        /// Time since the pool was built.
        pub uptime: Duration,
        /// Tasks accepted for execution.
        pub submitted: u64,
        /// Tasks that finished and produced a value.
        pub completed: u64,
        /// Tasks that finished with a captured failure.
        pub failed: u64,
        /// Tasks withdrawn before they ever ran.
        pub cancelled: u64,
        /// Tasks on a worker right now.
        pub running: u64,
        /// Most tasks ever on workers at once.
        pub running_peak: u64,
        /// Mean submit-to-terminal latency in nanoseconds.
        pub avg_latency_ns: u64,
        /// Median submit-to-terminal latency in nanoseconds.
        pub p50_latency_ns: u64,
        /// 95th percentile latency in nanoseconds.
        pub p95_latency_ns: u64,
        /// 99th percentile latency in nanoseconds.
        pub p99_latency_ns: u64,
        /// Worst observed latency in nanoseconds.
        pub max_latency_ns: u64,
    }
}

pub use imp::{PoolStats, StatsSnapshot};
