use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use sluice_sync::{ShutdownHandle, ShutdownSignal, WaitGroup, WaitGuard};

use crate::PoolError;
use crate::builder::{PanicHandler, PoolBuilder, TaskHandler};
use crate::collector::Collected;
use crate::stats::{Counters, PoolStats};

/// Lifecycle states of a [`WorkerPool`].
///
/// States only advance; there is no transition back once a pool is
/// [`Terminated`](Self::Terminated).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    /// The pool accepts submissions, but workers have not been started.
    Created = 0,
    /// Workers are processing items.
    Running = 1,
    /// The input queue is closed; queued items are still being drained.
    Draining = 2,
    /// All workers have exited.
    Terminated = 3,
}

impl PoolState {
    fn from_repr(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Terminated,
        }
    }
}

/// An asynchronous worker pool with bounded concurrency.
///
/// Submitted items are buffered on a bounded input queue and processed by a
/// fixed set of worker tasks. A counting semaphore of admission tokens caps
/// how many items are in flight at once, independently of the worker count.
/// Each result is published to a bounded output queue and drained through
/// [`collect`](Self::collect).
///
/// Item failures are isolated: a handler error is published as `Err` for
/// that item, a handler panic is routed to the panic handler, and the pool
/// keeps processing either way.
///
/// Dropping the pool cancels outstanding work the same way
/// [`shutdown`](Self::shutdown) does.
pub struct WorkerPool<T, R, E> {
    name: Arc<str>,
    runtime: tokio::runtime::Handle,
    state: AtomicU8,
    num_workers: usize,
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    input: Mutex<Option<flume::Sender<T>>>,
    output: flume::Receiver<Result<R, E>>,
    startup: Mutex<Option<Startup<T, R, E>>>,
    workers: WaitGroup,
    shutdown: ShutdownSignal,
    counters: Arc<Counters>,
}

/// The parts handed to workers when the pool starts.
struct Startup<T, R, E> {
    input_rx: flume::Receiver<T>,
    output_tx: flume::Sender<Result<R, E>>,
    handler: Arc<TaskHandler<T, R, E>>,
    panic_handler: Option<Arc<PanicHandler>>,
}

impl<T, R, E> WorkerPool<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(
        builder: PoolBuilder,
        queue_size: usize,
        handler: Arc<TaskHandler<T, R, E>>,
    ) -> Self {
        let (input_tx, input_rx) = flume::bounded(queue_size);
        let (output_tx, output_rx) = flume::bounded(queue_size);

        Self {
            name: builder.name.unwrap_or_else(|| "sluice".to_owned()).into(),
            runtime: builder.runtime,
            state: AtomicU8::new(PoolState::Created as u8),
            num_workers: builder.num_workers,
            max_concurrent: builder.max_concurrent,
            semaphore: Arc::new(Semaphore::new(builder.max_concurrent)),
            input: Mutex::new(Some(input_tx)),
            output: output_rx,
            startup: Mutex::new(Some(Startup {
                input_rx,
                output_tx,
                handler,
                panic_handler: builder.panic_handler,
            })),
            workers: WaitGroup::new(),
            shutdown: ShutdownSignal::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Returns the name of the pool.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> PoolState {
        PoolState::from_repr(self.state.load(Ordering::Acquire))
    }

    /// Returns a snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Enqueues an item for processing.
    ///
    /// Suspends only while the input queue is full. Fails with
    /// [`PoolError::Closed`] once the pool has been closed or shut down; the
    /// item is dropped in that case.
    pub async fn submit(&self, item: T) -> Result<(), PoolError> {
        let Some(input) = self.input.lock().clone() else {
            return Err(PoolError::Closed);
        };

        let mut shutdown = self.shutdown.handle();

        tokio::select! {
            result = input.send_async(item) => {
                result.map_err(|_| PoolError::Closed)?;
            }
            _ = shutdown.notified() => return Err(PoolError::Closed),
        }

        self.counters.incr_submitted();
        Ok(())
    }

    /// Starts the pool's workers on the runtime.
    ///
    /// Each worker repeatedly acquires one admission token, takes one item
    /// from the input queue, processes it, publishes the result, and releases
    /// the token. Workers exit once the input queue is closed and drained, or
    /// when shutdown is requested.
    pub fn run(&self) -> Result<(), PoolError> {
        self.state
            .compare_exchange(
                PoolState::Created as u8,
                PoolState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|actual| match PoolState::from_repr(actual) {
                PoolState::Running => PoolError::AlreadyRunning,
                _ => PoolError::Closed,
            })?;

        let startup = self
            .startup
            .lock()
            .take()
            .expect("startup parts are present until the pool runs");

        for index in 0..self.num_workers {
            let worker = Worker {
                index,
                pool_name: self.name.clone(),
                input: startup.input_rx.clone(),
                output: startup.output_tx.clone(),
                semaphore: self.semaphore.clone(),
                handler: startup.handler.clone(),
                panic_handler: startup.panic_handler.clone(),
                shutdown: self.shutdown.handle(),
                counters: self.counters.clone(),
                _guard: self.workers.guard(),
            };

            self.runtime.spawn(worker.run());
        }

        sluice_log::debug!(
            "pool {} started {} workers with admission capacity {}",
            self.name,
            self.num_workers,
            self.max_concurrent
        );

        Ok(())
    }

    /// Closes the input queue.
    ///
    /// No further submissions are accepted. Already queued items are still
    /// drained; workers terminate once the queue is empty. Idempotent.
    pub fn close(&self) {
        let input = self.input.lock().take();

        if input.is_some() {
            self.advance_to(PoolState::Draining);
            sluice_log::debug!("pool {} closed", self.name);
        }
    }

    /// Requests cooperative cancellation.
    ///
    /// The input queue is closed and workers observe the signal at their next
    /// suspension point: waiting for a token, waiting for an item, processing
    /// an item, or publishing a result. Queued and in-flight items are
    /// dropped. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.is_notified() {
            return;
        }

        self.input.lock().take();
        self.shutdown.notify(None);
        self.advance_to(PoolState::Draining);
        sluice_log::debug!("pool {} shutting down", self.name);
    }

    /// Waits until every worker has exited.
    ///
    /// Workers only exit after [`close`](Self::close) or
    /// [`shutdown`](Self::shutdown). Idempotent; subsequent calls return
    /// immediately.
    pub async fn wait(&self) {
        self.workers.wait().await;
        self.advance_to(PoolState::Terminated);
    }

    /// Returns the lazy sequence of results.
    ///
    /// See [`Collected`] for the stream's termination guarantees.
    pub fn collect(&self) -> Collected<R, E> {
        Collected::new(self.output.clone())
    }

    fn advance_to(&self, target: PoolState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (state < target as u8).then_some(target as u8)
            });
    }
}

/// A single worker task of a [`WorkerPool`].
struct Worker<T, R, E> {
    index: usize,
    pool_name: Arc<str>,
    input: flume::Receiver<T>,
    output: flume::Sender<Result<R, E>>,
    semaphore: Arc<Semaphore>,
    handler: Arc<TaskHandler<T, R, E>>,
    panic_handler: Option<Arc<PanicHandler>>,
    shutdown: ShutdownHandle,
    counters: Arc<Counters>,
    _guard: WaitGuard,
}

impl<T, R, E> Worker<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    async fn run(mut self) {
        loop {
            // The admission token is held from before an item is taken until
            // its result has been published.
            let permit = tokio::select! {
                permit = self.semaphore.clone().acquire_owned() => {
                    permit.expect("the semaphore is never closed")
                }
                _ = self.shutdown.notified() => break,
            };

            let item = tokio::select! {
                item = self.input.recv_async() => match item {
                    Ok(item) => item,
                    // Closed and drained.
                    Err(_) => break,
                },
                _ = self.shutdown.notified() => break,
            };

            let task = AssertUnwindSafe((self.handler)(item)).catch_unwind();
            let outcome = tokio::select! {
                outcome = task => outcome,
                _ = self.shutdown.notified() => break,
            };

            match outcome {
                Ok(result) => {
                    self.counters.record(&result);

                    let published = tokio::select! {
                        sent = self.output.send_async(result) => sent.is_ok(),
                        _ = self.shutdown.notified() => false,
                    };

                    if !published {
                        break;
                    }
                }
                Err(panic) => {
                    self.counters.incr_panicked();
                    match &self.panic_handler {
                        Some(handler) => handler(panic),
                        None => sluice_log::error!(
                            "task in pool {} panicked, skipping its result",
                            self.pool_name
                        ),
                    }
                }
            }

            drop(permit);
        }

        sluice_log::trace!("pool {} worker {} exiting", self.pool_name, self.index);
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::runtime::Handle;
    use tokio::time::{sleep, timeout};

    use sluice_sync::WaitGroup;

    use crate::PoolBuilder;

    use super::*;

    fn pool_builder() -> PoolBuilder {
        PoolBuilder::new(Handle::current()).name("test")
    }

    #[tokio::test]
    async fn test_pool_processes_all_items() {
        sluice_log::init_test!();

        let pool = pool_builder()
            .num_workers(4)
            .max_concurrent(2)
            .queue_size(32)
            .build(|item: u64| async move { Ok::<_, Infallible>(item * item) })
            .unwrap();

        pool.run().unwrap();
        for i in 0..20 {
            pool.submit(i).await.unwrap();
        }
        pool.close();
        pool.wait().await;

        let results: Vec<_> = pool.collect().collect().await;
        assert_eq!(results.len(), 20);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let pool = pool_builder()
            .num_workers(8)
            .max_concurrent(3)
            .queue_size(64)
            .build({
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                move |item: u64| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(current, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, Infallible>(item)
                    }
                }
            })
            .unwrap();

        pool.run().unwrap();
        for i in 0..32 {
            pool.submit(i).await.unwrap();
        }
        pool.close();

        let results: Vec<_> = pool.collect().collect().await;
        pool.wait().await;

        assert_eq!(results.len(), 32);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_sum_of_squares() {
        // 100 items through 50 workers throttled to 5 concurrent tasks.
        let pool = pool_builder()
            .num_workers(50)
            .max_concurrent(5)
            .build(|item: u64| async move { Ok::<_, Infallible>(item * item) })
            .unwrap();

        pool.run().unwrap();

        // Collect concurrently so the bounded output queue never stalls the
        // workers.
        let collector = tokio::spawn({
            let results = pool.collect();
            async move {
                results
                    .fold((0u64, 0usize), |(sum, count), result| async move {
                        (sum + result.unwrap(), count + 1)
                    })
                    .await
            }
        });

        for i in 0..100 {
            pool.submit(i).await.unwrap();
        }
        pool.close();
        pool.wait().await;

        let (sum, count) = collector.await.unwrap();
        assert_eq!(count, 100);
        assert_eq!(sum, 328350);
    }

    #[tokio::test]
    async fn test_two_layers_of_completion() {
        let pool = Arc::new(
            pool_builder()
                .num_workers(50)
                .max_concurrent(2)
                .queue_size(16)
                .build(|job: usize| async move {
                    sleep(Duration::from_millis(5)).await;
                    Ok::<_, Infallible>(job)
                })
                .unwrap(),
        );

        pool.run().unwrap();

        let collector = tokio::spawn(pool.collect().count());

        // Jobs are produced by a separate task layer, tracked by its own
        // wait group the same way the pool tracks its workers.
        let jobs = WaitGroup::new();
        for i in 0..10 {
            let guard = jobs.guard();
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.submit(i).await.unwrap();
                drop(guard);
            });
        }

        jobs.wait().await;
        pool.close();
        pool.wait().await;
        assert_eq!(pool.state(), PoolState::Terminated);

        assert_eq!(collector.await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_submit_after_close_fails() {
        let pool = pool_builder()
            .build(|item: u64| async move { Ok::<_, Infallible>(item) })
            .unwrap();

        pool.run().unwrap();
        pool.close();

        assert_eq!(pool.submit(1).await, Err(PoolError::Closed));
        pool.wait().await;
    }

    #[tokio::test]
    async fn test_wait_is_idempotent() {
        let pool = pool_builder()
            .num_workers(2)
            .queue_size(8)
            .build(|item: u64| async move { Ok::<_, Infallible>(item) })
            .unwrap();

        pool.run().unwrap();
        for i in 0..4 {
            pool.submit(i).await.unwrap();
        }
        pool.close();
        pool.wait().await;

        // The second wait must return immediately.
        timeout(Duration::from_millis(100), pool.wait())
            .await
            .unwrap();
        assert_eq!(pool.state(), PoolState::Terminated);
    }

    #[tokio::test]
    async fn test_wait_returns_after_all_results_are_published() {
        let pool = pool_builder()
            .num_workers(4)
            .max_concurrent(2)
            .queue_size(16)
            .build(|item: u64| async move { Ok::<_, Infallible>(item + 1) })
            .unwrap();

        pool.run().unwrap();
        for i in 0..10 {
            pool.submit(i).await.unwrap();
        }
        pool.close();
        pool.wait().await;

        // All workers have exited, so every result is already buffered and
        // the stream terminates without further producers.
        let results: Vec<_> = pool.collect().collect().await;
        assert_eq!(results.len(), 10);
    }

    #[tokio::test]
    async fn test_items_submitted_before_run_are_drained() {
        let pool = pool_builder()
            .num_workers(2)
            .queue_size(8)
            .build(|item: u64| async move { Ok::<_, Infallible>(item) })
            .unwrap();

        for i in 0..3 {
            pool.submit(i).await.unwrap();
        }

        pool.run().unwrap();
        pool.close();
        pool.wait().await;

        let results: Vec<_> = pool.collect().collect().await;
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let pool = pool_builder()
            .build(|item: u64| async move { Ok::<_, Infallible>(item) })
            .unwrap();

        assert_eq!(pool.state(), PoolState::Created);

        pool.run().unwrap();
        assert_eq!(pool.state(), PoolState::Running);
        assert_eq!(pool.run(), Err(PoolError::AlreadyRunning));

        pool.close();
        pool.close();
        assert_eq!(pool.state(), PoolState::Draining);
        assert_eq!(pool.run(), Err(PoolError::Closed));

        pool.wait().await;
        assert_eq!(pool.state(), PoolState::Terminated);
        assert_eq!(pool.run(), Err(PoolError::Closed));
    }

    #[tokio::test]
    async fn test_item_failures_are_isolated() {
        let pool = pool_builder()
            .num_workers(4)
            .max_concurrent(2)
            .queue_size(32)
            .build(|item: u32| async move {
                if item % 2 == 0 {
                    Ok(item)
                } else {
                    Err(format!("item {item} failed"))
                }
            })
            .unwrap();

        pool.run().unwrap();
        for i in 0..10 {
            pool.submit(i).await.unwrap();
        }
        pool.close();
        pool.wait().await;

        let results: Vec<_> = pool.collect().collect().await;
        let (ok, err): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
        assert_eq!(ok.len(), 5);
        assert_eq!(err.len(), 5);

        let stats = pool.stats();
        assert_eq!(stats.submitted, 10);
        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.failed, 5);
    }

    #[tokio::test]
    async fn test_task_panics_are_contained() {
        let pool = pool_builder()
            .num_workers(2)
            .max_concurrent(2)
            .queue_size(8)
            .build(|item: u32| async move {
                assert!(item != 3, "poisoned item");
                Ok::<_, Infallible>(item)
            })
            .unwrap();

        pool.run().unwrap();
        for i in 0..6 {
            pool.submit(i).await.unwrap();
        }
        pool.close();
        pool.wait().await;

        let results: Vec<_> = pool.collect().collect().await;
        assert_eq!(results.len(), 5);
        assert_eq!(pool.stats().panicked, 1);
    }

    #[tokio::test]
    async fn test_task_panic_handler() {
        let panics = Arc::new(AtomicUsize::new(0));

        let pool = pool_builder()
            .task_panic_handler({
                let panics = panics.clone();
                move |_| {
                    panics.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build(|item: u32| async move {
                assert!(item != 1, "boom");
                Ok::<_, Infallible>(item)
            })
            .unwrap();

        pool.run().unwrap();
        pool.submit(1).await.unwrap();
        pool.close();
        pool.wait().await;

        assert_eq!(panics.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_work() {
        sluice_log::init_test!();

        let pool = pool_builder()
            .num_workers(2)
            .max_concurrent(1)
            .queue_size(8)
            .build(|item: u64| async move {
                sleep(Duration::from_secs(30)).await;
                Ok::<_, Infallible>(item)
            })
            .unwrap();

        pool.run().unwrap();
        for i in 0..4 {
            pool.submit(i).await.unwrap();
        }

        pool.shutdown();
        timeout(Duration::from_secs(5), pool.wait()).await.unwrap();

        assert_eq!(pool.submit(9).await, Err(PoolError::Closed));
        assert_eq!(pool.state(), PoolState::Terminated);
    }
}
