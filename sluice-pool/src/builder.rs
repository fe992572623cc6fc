use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::BuildError;
use crate::pool::WorkerPool;

/// Type alias for a thread safe closure that is used for panic handling
/// across the code.
pub(crate) type PanicHandler = dyn Fn(Box<dyn Any + Send>) + Send + Sync;

/// Type alias for the boxed form of a pool's task handler.
pub(crate) type TaskHandler<T, R, E> =
    dyn Fn(T) -> BoxFuture<'static, Result<R, E>> + Send + Sync;

/// [`PoolBuilder`] provides a flexible way to configure and build a
/// [`WorkerPool`] for processing a stream of items with bounded concurrency.
///
/// This builder enables you to customize the worker count, the admission
/// capacity, queue sizes, the pool name used in logs, and panic handling.
pub struct PoolBuilder {
    pub(crate) runtime: tokio::runtime::Handle,
    pub(crate) name: Option<String>,
    pub(crate) num_workers: usize,
    pub(crate) max_concurrent: usize,
    pub(crate) queue_size: Option<usize>,
    pub(crate) panic_handler: Option<Arc<PanicHandler>>,
}

impl PoolBuilder {
    /// Initializes a new [`PoolBuilder`] with default settings.
    ///
    /// The builder is tied to the provided [`tokio::runtime::Handle`], on
    /// which the pool's workers will be spawned.
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self {
            runtime,
            name: None,
            num_workers: 1,
            max_concurrent: 1,
            queue_size: None,
            panic_handler: None,
        }
    }

    /// Sets the name of the pool, used in log messages.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the number of worker tasks for the pool.
    ///
    /// Workers may be over-provisioned relative to the admission capacity;
    /// surplus workers wait for an admission token.
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Sets the admission capacity, the maximum number of items processed
    /// concurrently.
    ///
    /// This bounds concurrent resource usage independently of the worker
    /// count, e.g. to throttle calls to a downstream system.
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Sets the capacity of the input and output queues.
    ///
    /// Defaults to twice the number of workers. This allows new items to be
    /// queued while existing ones are being processed and provides natural
    /// backpressure to submitters when workers are overwhelmed.
    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = Some(queue_size);
        self
    }

    /// Sets a custom panic handler for tasks executed by the pool.
    ///
    /// If a task panics, the handler is invoked with the panic payload and
    /// the worker continues with the next item. The default handler logs the
    /// panic.
    pub fn task_panic_handler<F>(mut self, panic_handler: F) -> Self
    where
        F: Fn(Box<dyn Any + Send>) + Send + Sync + 'static,
    {
        self.panic_handler = Some(Arc::new(panic_handler));
        self
    }

    /// Constructs a [`WorkerPool`] that processes items with `handler`.
    ///
    /// The handler is invoked once per submitted item; its `Result` is
    /// published to the pool's output for collection. Configurations that
    /// could never make progress are rejected with a [`BuildError`].
    pub fn build<T, R, E, F, Fut>(self, handler: F) -> Result<WorkerPool<T, R, E>, BuildError>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        if self.num_workers == 0 {
            return Err(BuildError::InvalidWorkers);
        }

        if self.max_concurrent == 0 {
            return Err(BuildError::InvalidConcurrency);
        }

        let queue_size = match self.queue_size {
            Some(0) => return Err(BuildError::InvalidQueueSize),
            Some(queue_size) => queue_size,
            None => self.num_workers * 2,
        };

        let handler: Arc<TaskHandler<T, R, E>> = Arc::new(move |item| handler(item).boxed());

        Ok(WorkerPool::new(self, queue_size, handler))
    }
}
