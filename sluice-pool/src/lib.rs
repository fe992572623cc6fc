//! # Sluice Pool
//!
//! This crate provides a bounded asynchronous worker pool for processing a
//! stream of items, designed for fan-out/fan-in workloads:
//!
//! - **Bounded concurrency**: a fixed pool of admission tokens caps how many
//!   items are processed at once, independently of the worker count. Workers
//!   may be over-provisioned while downstream resource usage stays throttled.
//! - **Backpressure**: input and output queues are bounded. When workers are
//!   overwhelmed, submission suspends until capacity becomes available.
//! - **Failure isolation**: a failing or panicking item never aborts the
//!   pool. Item errors are published alongside successes; panics are caught
//!   per task and routed to a configurable panic handler.
//! - **Cooperative cancellation**: a shutdown signal is observed at every
//!   suspension point, so a pool can be stopped early.
//!
//! ## Lifecycle
//!
//! A pool moves through `Created -> Running -> Draining -> Terminated` and
//! never backwards. Producers [`submit`](WorkerPool::submit) items,
//! [`run`](WorkerPool::run) starts the workers, [`close`](WorkerPool::close)
//! ends the input, [`collect`](WorkerPool::collect) drains the results, and
//! [`wait`](WorkerPool::wait) blocks until every worker has exited. Result
//! order is unspecified; workers race for admission tokens.
//!
//! ## Usage Example
//!
//! ```
//! use futures::StreamExt;
//! use sluice_pool::PoolBuilder;
//! use tokio::runtime::Handle;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let runtime = tokio::runtime::Runtime::new()?;
//! # runtime.block_on(async {
//! // Build a pool with 4 workers, at most 2 items in flight.
//! let pool = PoolBuilder::new(Handle::current())
//!     .num_workers(4)
//!     .max_concurrent(2)
//!     .build(|item: u32| async move { Ok::<_, String>(item * 2) })?;
//!
//! pool.run()?;
//! pool.submit(21).await?;
//! pool.close();
//!
//! let mut results = pool.collect();
//! assert_eq!(results.next().await, Some(Ok(42)));
//!
//! pool.wait().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # })?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod collector;
mod error;
mod pool;
mod stats;

pub use self::builder::*;
pub use self::collector::*;
pub use self::error::*;
pub use self::pool::*;
pub use self::stats::*;
