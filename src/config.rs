use crate::error::{Error, Result};

/// Backing execution model for a pool, fixed for the pool's lifetime.
///
/// Threads share one address space: cheap to start, no serialization at the
/// submission boundary, but a misbehaving task can take the whole process
/// down with it. Processes isolate each worker's memory completely: higher
/// startup and transfer cost, and jobs must cross the boundary as bytes, but
/// a crashing worker only loses its own task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionModel {
    Threads,
    Processes,
}

impl Default for ExecutionModel {
    fn default() -> Self {
        ExecutionModel::Threads
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Concurrency ceiling. `None` means one worker per logical CPU.
    pub workers: Option<usize>,
    pub execution_model: ExecutionModel,
    pub worker_name_prefix: String,
    /// Stack size for worker threads; ignored by process-backed pools.
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: None,
            execution_model: ExecutionModel::default(),
            worker_name_prefix: "brigade-worker".to_string(),
            stack_size: Some(2 * 1024 * 1024),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.workers {
            if n == 0 {
                return Err(Error::config("workers must be > 0"));
            }
            if n > 1024 {
                return Err(Error::config("workers too large (max 1024)"));
            }
        }

        if self.worker_name_prefix.is_empty() {
            return Err(Error::config("worker_name_prefix must not be empty"));
        }

        Ok(())
    }

    /// Resolved worker count, defaulting to the number of logical CPUs.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = Some(n);
        self
    }

    pub fn execution_model(mut self, model: ExecutionModel) -> Self {
        self.config.execution_model = model;
        self
    }

    pub fn worker_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.worker_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
