pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The task's code panicked; carries the captured panic message.
    /// Reported only at retrieval time, never at submission.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// A bounded wait elapsed before the task reached a terminal state.
    /// The task itself is unaffected and keeps running.
    #[error("timed out waiting for task result")]
    Timeout,

    /// Submission was attempted after the pool stopped accepting work.
    #[error("pool is closed")]
    PoolClosed,

    /// The task was cancelled before it started running.
    #[error("task cancelled before it started")]
    Cancelled,

    /// The task's outcome was already taken through this handle.
    #[error("task outcome already retrieved")]
    Retrieved,

    /// Arguments or results could not cross the process boundary.
    /// Surfaces at submission for job encoding, at retrieval for results.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A worker process died while running the task. Only the affected
    /// task fails; the pool replaces the worker.
    #[error("worker lost: {0}")]
    WorkerLost(String),

    /// A worker thread or process could not be started.
    #[error("worker spawn failed: {0}")]
    Spawn(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("default pool not initialized")]
    NotInitialized,

    #[error("default pool already initialized")]
    AlreadyInitialized,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn spawn<S: Into<String>>(msg: S) -> Self {
        Error::Spawn(msg.into())
    }

    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Error::Serialization(msg.into())
    }

    pub fn worker_lost<S: Into<String>>(msg: S) -> Self {
        Error::WorkerLost(msg.into())
    }

    pub fn task_failed<S: Into<String>>(msg: S) -> Self {
        Error::TaskFailed(msg.into())
    }
}
