use thiserror::Error;

/// Configuration errors rejected when constructing a pool.
///
/// All of these describe configurations that could never make progress, so
/// they are refused up front instead of deadlocking at runtime.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The admission capacity is zero, so no item would ever be admitted.
    #[error("the admission capacity must be greater than zero")]
    InvalidConcurrency,

    /// The worker count is zero, so no item would ever be processed.
    #[error("the worker count must be greater than zero")]
    InvalidWorkers,

    /// The queue capacity is zero, so every submission would stall forever.
    #[error("the queue capacity must be greater than zero")]
    InvalidQueueSize,
}

/// Errors returned by pool lifecycle operations.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool no longer accepts work.
    #[error("the pool has been closed")]
    Closed,

    /// The pool's workers have already been started.
    #[error("the pool is already running")]
    AlreadyRunning,
}
