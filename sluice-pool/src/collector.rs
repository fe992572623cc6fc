use std::pin::Pin;
use std::task::{Context, Poll};

use flume::r#async::RecvStream;
use futures::Stream;
use pin_project_lite::pin_project;

pin_project! {
    /// A lazy, finite sequence of results drained from a pool.
    ///
    /// The stream yields one `Result` per processed item and terminates once
    /// the pool's output queue closes, which happens only after every worker
    /// has exited. Multiple collectors may run concurrently; each result is
    /// delivered to exactly one of them.
    ///
    /// Returned by [`WorkerPool::collect`](crate::WorkerPool::collect).
    pub struct Collected<R: 'static, E: 'static> {
        #[pin]
        inner: RecvStream<'static, Result<R, E>>,
    }
}

impl<R: 'static, E: 'static> Collected<R, E> {
    pub(crate) fn new(receiver: flume::Receiver<Result<R, E>>) -> Self {
        Self {
            inner: receiver.into_stream(),
        }
    }
}

impl<R: 'static, E: 'static> Stream for Collected<R, E> {
    type Item = Result<R, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
