use std::time::Duration;

use tokio::sync::watch;

/// Shutdown request broadcast to cooperating tasks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shutdown {
    /// The timeout for this shutdown. `None` indicates an immediate shutdown.
    pub timeout: Option<Duration>,
}

/// The sending side of a shutdown broadcast.
///
/// A [`ShutdownSignal`] is owned by the component that decides when to stop,
/// for example a worker pool. Tasks obtain a [`ShutdownHandle`] through
/// [`handle`](Self::handle) and await it at every suspension point.
///
/// Dropping the signal counts as an immediate shutdown for all handles.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<Option<Shutdown>>,
}

impl ShutdownSignal {
    /// Creates a new signal with no shutdown requested.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Returns a handle that resolves once shutdown is requested.
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Requests shutdown with the given timeout.
    ///
    /// Only the first call has an effect; later calls keep the original
    /// timeout.
    pub fn notify(&self, timeout: Option<Duration>) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }

            *current = Some(Shutdown { timeout });
            true
        });
    }

    /// Returns `true` if shutdown has been requested.
    pub fn is_notified(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving side of a shutdown broadcast.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    rx: watch::Receiver<Option<Shutdown>>,
}

impl ShutdownHandle {
    /// Resolves once shutdown has been requested.
    ///
    /// Resolves immediately if shutdown was requested before this call. If
    /// the owning [`ShutdownSignal`] is gone, this counts as an immediate
    /// shutdown. The future is cancellation safe and can be used in
    /// `select!` arms.
    pub async fn notified(&mut self) -> Shutdown {
        match self.rx.wait_for(Option::is_some).await {
            Ok(shutdown) => shutdown
                .clone()
                .expect("the predicate guarantees a shutdown value"),
            Err(_) => Shutdown { timeout: None },
        }
    }

    /// Returns `true` if shutdown has been requested, without suspending.
    pub fn is_notified(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_resolves_handles() {
        let signal = ShutdownSignal::new();
        let mut handle = signal.handle();

        assert!(!handle.is_notified());

        signal.notify(Some(Duration::from_secs(10)));
        let shutdown = handle.notified().await;

        assert_eq!(shutdown.timeout, Some(Duration::from_secs(10)));
        assert!(handle.is_notified());
    }

    #[tokio::test]
    async fn test_notified_after_the_fact() {
        let signal = ShutdownSignal::new();
        signal.notify(None);

        // Handles created after the request still resolve immediately.
        let mut handle = signal.handle();
        assert_eq!(handle.notified().await, Shutdown { timeout: None });
    }

    #[tokio::test]
    async fn test_first_notify_wins() {
        let signal = ShutdownSignal::new();
        let mut handle = signal.handle();

        signal.notify(Some(Duration::from_secs(1)));
        signal.notify(None);

        let shutdown = handle.notified().await;
        assert_eq!(shutdown.timeout, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_dropped_signal_is_immediate_shutdown() {
        let signal = ShutdownSignal::new();
        let mut handle = signal.handle();

        drop(signal);

        assert_eq!(handle.notified().await, Shutdown { timeout: None });
    }
}
