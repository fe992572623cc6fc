use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters incremented by the pool and its workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    pub fn incr_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record<R, E>(&self, result: &Result<R, E>) {
        match result {
            Ok(_) => self.succeeded.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of a pool's counters.
///
/// Snapshots serialize to JSON for structured log output and reporting, and
/// can be diffed across batch runs.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Number of items accepted by [`submit`](crate::WorkerPool::submit).
    pub submitted: u64,
    /// Number of items processed successfully.
    pub succeeded: u64,
    /// Number of items whose handler returned an error.
    pub failed: u64,
    /// Number of items whose handler panicked.
    pub panicked: u64,
}
