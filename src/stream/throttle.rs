//! Rate limiting for notification streams

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::time::{Instant, Sleep, sleep};

/// Adds [`throttle`](ThrottleExt::throttle) to every stream.
pub trait ThrottleExt: Stream {
    /// Emit at most one item per `period`.
    ///
    /// Items arriving while the period runs are coalesced and the latest one
    /// is emitted when it ends. Nothing is emitted while no item is waiting.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream returned by [`ThrottleExt::throttle`].
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        #[pin]
        delay: Sleep,
        period: Duration,
        pending: Option<S::Item>,
        armed: bool,
        finished: bool,
    }
}

impl<S: Stream> Throttle<S> {
    /// Must be called within a tokio runtime.
    pub fn new(stream: S, period: Duration) -> Self {
        Self { stream, delay: sleep(Duration::ZERO), period, pending: None, armed: false, finished: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.finished {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                Poll::Ready(None) => *this.finished = true,
                Poll::Pending => break,
            }
        }

        if this.pending.is_none() {
            return if *this.finished { Poll::Ready(None) } else { Poll::Pending };
        }
        if *this.armed && this.delay.as_mut().poll(cx).is_pending() {
            return Poll::Pending;
        }

        this.delay.as_mut().reset(Instant::now() + *this.period);
        *this.armed = true;
        Poll::Ready(this.pending.take())
    }
}
