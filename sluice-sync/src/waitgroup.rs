use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;

/// A counting completion primitive.
///
/// A [`WaitGroup`] tracks an arbitrary number of outstanding work units.
/// Producers register units with [`add`](Self::add) or [`guard`](Self::guard)
/// before spawning the work, workers report completion with
/// [`done`](Self::done) or by dropping their [`WaitGuard`], and any number of
/// callers can await the count reaching zero with [`wait`](Self::wait).
///
/// Registration may happen from within tracked tasks, which makes nested
/// fan-out safe: a task increments the counter for each dependent it spawns
/// before it exits, so the count never reaches zero while dependents are
/// still outstanding.
///
/// Clones share the same counter.
#[derive(Clone, Debug)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    count: AtomicUsize,
    tx: watch::Sender<()>,
}

impl WaitGroup {
    /// Creates a new wait group with a count of zero.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(());

        Self {
            inner: Arc::new(Inner {
                count: AtomicUsize::new(0),
                tx,
            }),
        }
    }

    /// Registers `n` additional units of outstanding work.
    ///
    /// Call this before spawning the work it accounts for, so that the
    /// increment is visible before the corresponding [`done`](Self::done).
    pub fn add(&self, n: usize) {
        self.inner.count.fetch_add(n, Ordering::AcqRel);
    }

    /// Marks one unit of work as complete.
    ///
    /// # Panics
    ///
    /// Panics if called more often than units were registered.
    pub fn done(&self) {
        let previous = self.inner.count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "wait group counter underflow");

        if previous == 1 {
            self.inner.tx.send_replace(());
        }
    }

    /// Registers one unit of work and returns a guard that completes it on drop.
    ///
    /// The guard reports completion even if the owning task panics, which
    /// keeps [`wait`](Self::wait) from blocking forever.
    pub fn guard(&self) -> WaitGuard {
        self.add(1);
        WaitGuard { wg: self.clone() }
    }

    /// Returns the current number of outstanding units.
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Waits until the count reaches zero.
    ///
    /// Returns immediately if the count is already zero, so repeated calls
    /// after completion are cheap.
    pub async fn wait(&self) {
        let mut rx = self.inner.tx.subscribe();

        while self.inner.count.load(Ordering::Acquire) != 0 {
            rx.changed()
                .await
                .expect("the sender is owned by the wait group");
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// Completes one unit of work on a [`WaitGroup`] when dropped.
#[must_use = "the guard reports completion when dropped"]
#[derive(Debug)]
pub struct WaitGuard {
    wg: WaitGroup,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        self.wg.done();
    }
}
