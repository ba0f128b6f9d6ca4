// Bounded one-to-many broadcast with eviction of subscribers that fall behind.
//
// Unlike `tokio::sync::broadcast`, a lagging receiver does not silently skip
// items: every subscriber sees every item published while it was subscribed,
// in publish order, or it is dropped from the set for good.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

pub type SubscriberId = u64;

/// Largest per-subscriber queue; mpsc refuses anything near `usize::MAX`.
pub const MAX_CAPACITY: usize = 1 << 16;

/// Outcome of a single publish, mostly useful for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub evicted: usize,
}

struct Inner<T> {
    name: &'static str,
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<T>>>,
}

impl<T> Inner<T> {
    // Publishing never panics while holding the lock, so a poisoned set is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<T>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to one logical channel; clones share the subscriber set.
pub struct FanOut<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for FanOut<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for FanOut<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> FanOut<T> {
    /// Creates a channel whose subscriber queues each hold `capacity` items.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                // mpsc rejects a zero capacity
                capacity: capacity.clamp(1, MAX_CAPACITY),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Allocates a new bounded queue and registers it in the live set.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let live = {
            let mut subscribers = self.inner.lock();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        debug!(channel = self.inner.name, subscriber = id, live, "subscribed");

        Subscription {
            id,
            rx,
            channel: Arc::downgrade(&self.inner),
            evicted: false,
        }
    }

    /// Removes a subscriber. Returns false when it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.inner.lock().remove(&id).is_some();
        if removed {
            debug!(channel = self.inner.name, subscriber = id, "unsubscribed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.inner.lock().contains_key(&id)
    }
}

impl<T: Clone> FanOut<T> {
    /// Enqueues `item` on every live subscriber without blocking.
    ///
    /// Subscribers whose queue is full (or whose receiver is gone) are removed
    /// after the pass; items they already hold stay drainable.
    pub fn publish(&self, item: T) -> PublishReport {
        let mut report = PublishReport::default();
        let mut dead: Vec<SubscriberId> = Vec::new();

        let mut subscribers = self.inner.lock();
        for (id, tx) in subscribers.iter() {
            match tx.try_send(item.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        channel = self.inner.name,
                        subscriber = *id,
                        capacity = self.inner.capacity,
                        "subscriber queue full; evicting"
                    );
                    dead.push(*id);
                }
                Err(TrySendError::Closed(_)) => dead.push(*id),
            }
        }
        for id in &dead {
            subscribers.remove(id);
        }
        report.evicted = dead.len();
        report
    }
}

/// Receiving end of one subscriber queue. Dropping it unsubscribes.
pub struct Subscription<T> {
    id: SubscriberId,
    rx: mpsc::Receiver<T>,
    channel: Weak<Inner<T>>,
    evicted: bool,
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("evicted", &self.evicted)
            .finish()
    }
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Takes the next queued item without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.evicted = true;
                None
            }
        }
    }

    /// Waits for the next item. `None` once the subscriber was evicted (or the
    /// channel dropped) and the already-queued items are drained.
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.rx.recv().await;
        if item.is_none() {
            self.evicted = true;
        }
        item
    }

    /// True once a receive observed that the queue was cut off.
    pub fn is_evicted(&self) -> bool {
        self.evicted
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.lock().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_ops_in_publish_order() {
        let channel = FanOut::new("test", 8);
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        channel.publish("A");
        channel.publish("B");

        assert_eq!(first.try_next(), Some("A"));
        assert_eq!(first.try_next(), Some("B"));
        assert_eq!(second.try_next(), Some("A"));
        assert_eq!(second.try_next(), Some("B"));
        assert_eq!(first.try_next(), None);
    }

    #[test]
    fn when_queue_is_full_then_publish_n_plus_one_evicts_only_that_subscriber() {
        let capacity = 4;
        let channel = FanOut::new("test", capacity);
        let mut slow = channel.subscribe();
        let mut fast = channel.subscribe();

        for n in 0..capacity {
            let report = channel.publish(n);
            assert_eq!(report, PublishReport { delivered: 2, evicted: 0 });
            // the fast subscriber keeps up
            assert_eq!(fast.try_next(), Some(n));
        }

        let report = channel.publish(capacity);
        assert_eq!(report, PublishReport { delivered: 1, evicted: 1 });
        assert!(!channel.is_subscribed(slow.id()));
        assert!(channel.is_subscribed(fast.id()));
        assert_eq!(fast.try_next(), Some(capacity));

        // items enqueued before eviction are still delivered, then the queue ends
        let drained: Vec<usize> = std::iter::from_fn(|| slow.try_next()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(slow.is_evicted());
        assert!(!fast.is_evicted());

        // later publishes no longer reach the evicted subscriber
        channel.publish(99);
        assert_eq!(slow.try_next(), None);
        assert_eq!(fast.try_next(), Some(99));
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let channel: FanOut<u8> = FanOut::new("test", 1);
        assert_eq!(channel.publish(1), PublishReport::default());
    }

    #[test]
    fn dropping_a_subscription_unsubscribes_it() {
        let channel: FanOut<u8> = FanOut::new("test", 2);
        let subscription = channel.subscribe();
        let other = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        drop(subscription);

        assert_eq!(channel.subscriber_count(), 1);
        assert!(channel.is_subscribed(other.id()));
    }

    #[test]
    fn explicit_unsubscribe_stops_future_deliveries() {
        let channel = FanOut::new("test", 2);
        let mut subscription = channel.subscribe();

        assert!(channel.unsubscribe(subscription.id()));
        assert!(!channel.unsubscribe(subscription.id()));
        channel.publish(5);

        assert_eq!(subscription.try_next(), None);
        assert!(subscription.is_evicted());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let channel = FanOut::new("test", 0);
        let mut subscription = channel.subscribe();

        assert_eq!(channel.capacity(), 1);
        assert_eq!(channel.publish(1).delivered, 1);
        assert_eq!(channel.publish(2).evicted, 1);
        assert_eq!(subscription.try_next(), Some(1));
    }

    #[test]
    fn oversized_capacity_is_capped() {
        let channel: FanOut<u8> = FanOut::new("test", usize::MAX);
        let _subscription = channel.subscribe();

        assert_eq!(channel.capacity(), MAX_CAPACITY);
        assert_eq!(channel.publish(1).delivered, 1);
    }

    #[tokio::test]
    async fn recv_waits_for_the_next_publish() {
        let channel = FanOut::new("test", 4);
        let mut subscription = channel.subscribe();
        let publisher = channel.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            publisher.publish("late");
        });

        assert_eq!(subscription.recv().await, Some("late"));
        handle.await.expect("publisher task");
    }
}
