pub use crate::config::{Config, ConfigBuilder, ExecutionModel};
pub use crate::context::{ContextCell, TaskScope};
pub use crate::error::{Error, Result};
pub use crate::pool::{
    init_worker, Job, MapResults, ProcessPool, TaskHandle, TaskId, TaskState, ThreadPool,
    WorkerPool,
};
pub use crate::timer::Timer;

pub use crate::stats::{PoolStats, StatsSnapshot};
pub use crate::{init, init_with_config, shutdown, spawn};
