//! Bounded handoff channel between the session task and display consumers
//!
//! The producer side never blocks or awaits. When the queue is full the
//! configured [`DropPolicy`] decides which record is lost; the aggregate store
//! remains the short-term record of truth, so a drop here only affects the
//! live feed of the consumer that fell behind.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;

use super::errors::MonitorError;

/// What to drop when the channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DropPolicy {
    /// Evict the oldest unconsumed item to make room (default)
    #[default]
    DropOldest,
    /// Discard the item being published
    DropNewest,
}

/// Outcome of a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffResult {
    /// Enqueued without loss
    Sent,
    /// Enqueued after evicting the oldest item
    EvictedOldest,
    /// Not enqueued, channel full
    Dropped,
    /// Not enqueued, every receiver is gone
    Closed,
}

impl HandoffResult {
    pub fn lost_item(&self) -> bool {
        !matches!(self, HandoffResult::Sent)
    }
}

#[derive(Debug)]
struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: DropPolicy,
    notify: Notify,
    senders: AtomicUsize,
    receivers: AtomicUsize,
    closed: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Create a bounded handoff channel
pub fn channel<T>(
    capacity: usize,
    policy: DropPolicy,
) -> Result<(HandoffSender<T>, HandoffReceiver<T>), MonitorError> {
    if capacity == 0 {
        return Err(MonitorError::ZeroCapacity { name: "handoff" });
    }

    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        policy,
        notify: Notify::new(),
        senders: AtomicUsize::new(1),
        receivers: AtomicUsize::new(1),
        closed: AtomicBool::new(false),
        published: AtomicU64::new(0),
        dropped: AtomicU64::new(0),
    });

    Ok((
        HandoffSender {
            shared: Arc::clone(&shared),
        },
        HandoffReceiver { shared },
    ))
}

/// Producer half. Cloneable; the channel closes when the last one drops.
#[derive(Debug)]
pub struct HandoffSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> HandoffSender<T> {
    /// Fire-and-forget publish. Never blocks on the consumer.
    pub fn publish(&self, item: T) -> HandoffResult {
        if self.shared.receivers.load(Ordering::Acquire) == 0 {
            return HandoffResult::Closed;
        }

        let result = {
            let mut queue = self.shared.queue.lock();
            if queue.len() < self.shared.capacity {
                queue.push_back(item);
                HandoffResult::Sent
            } else {
                match self.shared.policy {
                    DropPolicy::DropOldest => {
                        queue.pop_front();
                        queue.push_back(item);
                        HandoffResult::EvictedOldest
                    }
                    DropPolicy::DropNewest => HandoffResult::Dropped,
                }
            }
        };

        match result {
            HandoffResult::Sent => {
                self.shared.published.fetch_add(1, Ordering::Relaxed);
            }
            HandoffResult::EvictedOldest => {
                self.shared.published.fetch_add(1, Ordering::Relaxed);
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Handoff full, evicted oldest record");
            }
            HandoffResult::Dropped => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Handoff full, dropped newest record");
            }
            HandoffResult::Closed => {}
        }

        if result != HandoffResult::Dropped {
            self.shared.notify.notify_one();
        }
        result
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for HandoffSender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.closed.store(true, Ordering::Release);
            self.shared.notify.notify_waiters();
        }
    }
}

/// Consumer half. Clones share one queue; each item goes to one receiver.
#[derive(Debug)]
pub struct HandoffReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> HandoffReceiver<T> {
    /// Take the oldest pending item, if any
    pub fn try_recv(&self) -> Option<T> {
        self.shared.queue.lock().pop_front()
    }

    /// Take every pending item, oldest first
    pub fn drain(&self) -> Vec<T> {
        self.shared.queue.lock().drain(..).collect()
    }

    /// Wait for the next item. Returns `None` once every sender is dropped
    /// and the queue is empty.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_recv() {
                return Some(item);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }

            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items accepted into the queue since creation
    pub fn published_count(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    /// Items lost to overflow since creation
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Clone for HandoffReceiver<T> {
    fn clone(&self) -> Self {
        self.shared.receivers.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for HandoffReceiver<T> {
    fn drop(&mut self) {
        if self.shared.receivers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.queue.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let (tx, rx) = channel(3, DropPolicy::DropOldest).unwrap();
        for i in 0..5 {
            tx.publish(i);
        }

        assert_eq!(rx.drain(), vec![2, 3, 4]);
        assert_eq!(rx.published_count(), 5);
        assert_eq!(rx.dropped_count(), 2);
    }

    #[test]
    fn test_drop_newest_keeps_oldest() {
        let (tx, rx) = channel(2, DropPolicy::DropNewest).unwrap();
        assert_eq!(tx.publish(1), HandoffResult::Sent);
        assert_eq!(tx.publish(2), HandoffResult::Sent);
        assert_eq!(tx.publish(3), HandoffResult::Dropped);

        assert_eq!(rx.drain(), vec![1, 2]);
        assert_eq!(rx.dropped_count(), 1);
    }

    #[test]
    fn test_publish_after_receivers_dropped() {
        let (tx, rx) = channel(2, DropPolicy::DropOldest).unwrap();
        drop(rx);
        assert_eq!(tx.publish(1), HandoffResult::Closed);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(channel::<u8>(0, DropPolicy::DropOldest).is_err());
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let (tx, rx) = channel(4, DropPolicy::DropOldest).unwrap();

        let consumer = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.publish(42u32);

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, Some(42));
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_senders_gone() {
        let (tx, rx) = channel(4, DropPolicy::DropOldest).unwrap();
        tx.publish(1u32);
        let tx2 = tx.clone();
        drop(tx);
        drop(tx2);

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }
}
