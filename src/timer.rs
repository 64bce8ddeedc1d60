//! Scoped wall-clock timing.

use std::time::{Duration, Instant};

/// Wall-clock timer that reports once, on every exit path.
///
/// The report fires from `Drop`, so a scope that panics or returns early
/// still produces a reading. [`stop`](Timer::stop) reports immediately
/// and hands back the measured duration; the later drop then stays
/// silent.
///
/// ```
/// use brigade::Timer;
///
/// let timer = Timer::start("load");
/// // ... the measured work ...
/// let elapsed = timer.stop();
/// println!("load took {:?}", elapsed);
/// ```
#[derive(Debug)]
pub struct Timer {
    name: String,
    started_at: Instant,
    reported: bool,
}

impl Timer {
    /// Start timing now, under `name`.
    pub fn start<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            started_at: Instant::now(),
            reported: false,
        }
    }

    /// Label the timer reports under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time elapsed so far, without stopping the timer.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stop and report now. Returns the measured duration.
    pub fn stop(mut self) -> Duration {
        let elapsed = self.started_at.elapsed();
        self.report(elapsed);
        elapsed
    }

    fn report(&mut self, elapsed: Duration) {
        if !self.reported {
            self.reported = true;
            tracing::info!(
                "[{}] elapsed time: {:.4} seconds",
                self.name,
                elapsed.as_secs_f64()
            );
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let elapsed = self.started_at.elapsed();
        self.report(elapsed);
    }
}
