//! Bounded FIFO with drop accounting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

use super::policy::OverflowPolicy;

/// Result of [`BackpressureHandler::offer`].
#[derive(Debug)]
#[must_use]
pub enum OfferOutcome<T> {
    /// The item was buffered.
    Accepted,
    /// The item was buffered and the returned oldest item was evicted.
    Displaced(T),
    /// The buffer was full; the returned item was not buffered.
    Rejected(T),
    /// The handler is closed; the returned item was not buffered.
    Closed(T),
}

impl<T> OfferOutcome<T> {
    /// Whether the offered item made it into the buffer.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::Displaced(_))
    }
}

/// Observable state of a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackpressureState {
    /// Handler name (usually the owning connection).
    pub name: String,
    /// Capacity.
    pub max_buffer_size: usize,
    /// Items currently buffered.
    pub current_buffer_size: usize,
    /// Items dropped since creation.
    pub dropped_message_count: u64,
}

/// A bounded FIFO buffer.
///
/// `offer` never blocks. When full, the [`OverflowPolicy`] decides which
/// item is dropped and the drop counter is incremented. The buffer never
/// holds more than `max_buffer_size` items.
#[derive(Debug)]
pub struct BackpressureHandler<T> {
    name: String,
    max_buffer_size: usize,
    policy: OverflowPolicy,
    queue: Mutex<VecDeque<T>>,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl<T> BackpressureHandler<T> {
    /// Create an empty handler.
    pub fn new(name: impl Into<String>, max_buffer_size: usize, policy: OverflowPolicy) -> Self {
        Self {
            name: name.into(),
            max_buffer_size,
            policy,
            queue: Mutex::new(VecDeque::with_capacity(max_buffer_size.min(1024))),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Handler name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer `item` if there is room, applying the overflow policy otherwise.
    pub fn offer(&self, item: T) -> OfferOutcome<T> {
        if self.is_closed() {
            return OfferOutcome::Closed(item);
        }

        let outcome = {
            let mut queue = self.lock();
            if queue.len() < self.max_buffer_size {
                queue.push_back(item);
                OfferOutcome::Accepted
            } else {
                match self.policy {
                    OverflowPolicy::DropNewest => OfferOutcome::Rejected(item),
                    OverflowPolicy::DropOldest => match queue.pop_front() {
                        Some(oldest) => {
                            queue.push_back(item);
                            OfferOutcome::Displaced(oldest)
                        }
                        // Zero capacity: nothing to evict.
                        None => OfferOutcome::Rejected(item),
                    },
                }
            }
        };

        match &outcome {
            OfferOutcome::Accepted => self.notify.notify_one(),
            OfferOutcome::Displaced(_) | OfferOutcome::Rejected(_) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    buffer = %self.name,
                    policy = ?self.policy,
                    capacity = self.max_buffer_size,
                    dropped_total = dropped,
                    "Buffer full, dropped message"
                );
                if outcome.is_accepted() {
                    self.notify.notify_one();
                }
            }
            OfferOutcome::Closed(_) => {}
        }
        outcome
    }

    /// Pop the oldest item without waiting.
    pub fn try_take(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Pop the oldest item, waiting up to `timeout` if the buffer is empty.
    ///
    /// Returns `None` on timeout, or once the handler is closed and drained.
    pub async fn take(&self, timeout: Duration) -> Option<T> {
        self.wait_next(Some(Instant::now() + timeout)).await
    }

    /// Pop the oldest item, waiting as long as needed.
    ///
    /// Returns `None` once the handler is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        self.wait_next(None).await
    }

    async fn wait_next(&self, deadline: Option<Instant>) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_take() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.try_take();
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Stop accepting items. Buffered items can still be taken.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Items currently buffered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Items dropped since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Current observable state.
    pub fn state(&self) -> BackpressureState {
        BackpressureState {
            name: self.name.clone(),
            max_buffer_size: self.max_buffer_size,
            current_buffer_size: self.len(),
            dropped_message_count: self.dropped_count(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_drop_newest_keeps_buffer_bounded() {
        let handler = BackpressureHandler::new("conn", 2, OverflowPolicy::DropNewest);
        assert!(handler.offer(1).is_accepted());
        assert!(handler.offer(2).is_accepted());
        assert!(matches!(handler.offer(3), OfferOutcome::Rejected(3)));

        let state = handler.state();
        assert_eq!(state.current_buffer_size, 2);
        assert_eq!(state.dropped_message_count, 1);
        assert_eq!(handler.try_take(), Some(1));
        assert_eq!(handler.try_take(), Some(2));
        assert_eq!(handler.try_take(), None);
    }

    #[test]
    fn test_drop_oldest_evicts_head() {
        let handler = BackpressureHandler::new("conn", 2, OverflowPolicy::DropOldest);
        let _ = handler.offer(1);
        let _ = handler.offer(2);
        assert!(matches!(handler.offer(3), OfferOutcome::Displaced(1)));
        assert_eq!(handler.dropped_count(), 1);
        assert_eq!(handler.try_take(), Some(2));
        assert_eq!(handler.try_take(), Some(3));
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let handler = BackpressureHandler::new("conn", 0, OverflowPolicy::DropOldest);
        assert!(matches!(handler.offer("x"), OfferOutcome::Rejected("x")));
        assert_eq!(handler.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_times_out_when_empty() {
        let handler: BackpressureHandler<u32> =
            BackpressureHandler::new("conn", 4, OverflowPolicy::DropNewest);
        assert_eq!(handler.take(Duration::from_millis(50)).await, None);
    }

    #[tokio::test]
    async fn test_take_wakes_on_offer() {
        let handler = Arc::new(BackpressureHandler::new("conn", 4, OverflowPolicy::DropNewest));
        let consumer = {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { handler.take(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        let _ = handler.offer(42u32);
        assert_eq!(consumer.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let handler = Arc::new(BackpressureHandler::new("conn", 4, OverflowPolicy::DropNewest));
        let _ = handler.offer(1u32);
        handler.close();
        assert!(matches!(handler.offer(2), OfferOutcome::Closed(2)));
        assert_eq!(handler.recv().await, Some(1));
        assert_eq!(handler.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let handler: Arc<BackpressureHandler<u32>> =
            Arc::new(BackpressureHandler::new("conn", 4, OverflowPolicy::DropNewest));
        let consumer = {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { handler.recv().await })
        };
        tokio::task::yield_now().await;
        handler.close();
        assert_eq!(consumer.await.unwrap(), None);
    }
}
