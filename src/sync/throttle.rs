//! Leading + trailing throttle.
//!
//! The first item passes immediately and opens a window. Items arriving while
//! the window is open are coalesced to the latest, which is emitted when the
//! window closes (and opens the next one). A pending item is flushed as soon as
//! the inner stream ends.

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};

pub struct Throttle<S: Stream> {
    inner: S,
    interval: Duration,
    window: Pin<Box<Sleep>>,
    window_open: bool,
    pending: Option<S::Item>,
    done: bool,
}

// `pending` is never pinned.
impl<S: Stream + Unpin> Unpin for Throttle<S> {}

/// Throttle `stream` to at most one item per `interval`, keeping the latest.
pub fn throttle<S: Stream + Unpin>(stream: S, interval: Duration) -> Throttle<S> {
    Throttle {
        inner: stream,
        interval,
        window: Box::pin(sleep_until(Instant::now())),
        window_open: false,
        pending: None,
        done: false,
    }
}

/// Roughly 30 years; stands in for intervals past the end of `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

impl<S: Stream + Unpin> Throttle<S> {
    fn open_window(&mut self) {
        let now = Instant::now();
        let end = now.checked_add(self.interval).unwrap_or_else(|| now + FAR_FUTURE);
        self.window.as_mut().reset(end);
        self.window_open = true;
    }
}

impl<S: Stream + Unpin> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        while !this.done {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(item)) if this.window_open => this.pending = Some(item),
                Poll::Ready(Some(item)) => {
                    this.open_window();
                    return Poll::Ready(Some(item));
                }
                Poll::Ready(None) => this.done = true,
                Poll::Pending => break,
            }
        }

        if this.done {
            return Poll::Ready(this.pending.take());
        }

        if this.window_open && this.window.as_mut().poll(cx).is_ready() {
            match this.pending.take() {
                Some(item) => {
                    this.open_window();
                    return Poll::Ready(Some(item));
                }
                None => this.window_open = false,
            }
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::{stream, StreamExt};

    #[tokio::test(start_paused = true)]
    async fn keeps_first_and_last_of_a_burst() {
        let out: Vec<u32> = throttle(stream::iter(1..=5), Duration::from_secs(5)).collect().await;
        assert_eq!(out, vec![1, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn trailing_item_waits_for_window() {
        let (tx, rx) = mpsc::unbounded();
        let mut throttled = throttle(rx, Duration::from_secs(5));
        let start = Instant::now();

        tx.unbounded_send(1).unwrap();
        tx.unbounded_send(2).unwrap();
        tx.unbounded_send(3).unwrap();
        assert_eq!(throttled.next().await, Some(1));
        assert_eq!(throttled.next().await, Some(3));
        assert!(start.elapsed() >= Duration::from_secs(5));

        drop(tx);
        assert_eq!(throttled.next().await, None);
    }

    #[tokio::test]
    async fn oversized_interval_does_not_overflow() {
        let out: Vec<u32> = throttle(stream::iter(1..=3), Duration::MAX).collect().await;
        assert_eq!(out, vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_window_lets_next_item_through() {
        let (tx, rx) = mpsc::unbounded();
        let mut throttled = throttle(rx, Duration::from_secs(1));

        tx.unbounded_send(1).unwrap();
        assert_eq!(throttled.next().await, Some(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        tx.unbounded_send(2).unwrap();
        assert_eq!(throttled.next().await, Some(2));
    }
}
