use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

/// Frames are serialized before they enter the channel, so a slow subscriber
/// never re-serializes and a dropped one costs nothing.
pub type Frame = String;

pub type SubscriptionId = u64;

/// Process-local map from topic to the open subscriber streams for it.
///
/// Ephemeral by contract: never persisted, empty after restart. The only
/// state shared between the publish and subscribe flows. The mutex guards
/// map mutation and the pre-broadcast snapshot only; it is never held
/// across an await point (sends go through unbounded channels and cannot
/// block).
#[derive(Default)]
pub struct SubscriberRegistry {
    topics: Mutex<HashMap<String, HashMap<SubscriptionId, mpsc::UnboundedSender<Frame>>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber stream under `topic_id`, creating the topic set on
    /// demand, and returns the id needed to deregister it.
    pub fn register(&self, topic_id: &str, sender: mpsc::UnboundedSender<Frame>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut topics = self.topics.lock().unwrap();
        let entries = topics.entry(topic_id.to_owned()).or_default();
        entries.insert(id, sender);
        tracing::info!(topic = topic_id, total = entries.len(), "subscriber registered");
        id
    }

    /// Idempotent: removing an entry that is already gone is a no-op. A
    /// topic with zero entries is dropped from the map, indistinguishable
    /// from one never subscribed to.
    pub fn deregister(&self, topic_id: &str, id: SubscriptionId) {
        let mut topics = self.topics.lock().unwrap();
        let Some(entries) = topics.get_mut(topic_id) else {
            return;
        };
        if entries.remove(&id).is_some() {
            tracing::info!(topic = topic_id, total = entries.len(), "subscriber deregistered");
        }
        if entries.is_empty() {
            topics.remove(topic_id);
        }
    }

    /// Delivers `frame` to every subscriber registered under `topic_id` at
    /// the moment of the call. The set is snapshotted under the lock, so a
    /// concurrent register does not receive the in-flight frame. A failed
    /// send means the receiving stream is gone; that entry is deregistered
    /// and delivery continues to the rest. Returns the delivered count.
    pub fn broadcast(&self, topic_id: &str, frame: &Frame) -> usize {
        let snapshot: Vec<(SubscriptionId, mpsc::UnboundedSender<Frame>)> = {
            let topics = self.topics.lock().unwrap();
            match topics.get(topic_id) {
                Some(entries) => entries.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (id, sender) in snapshot {
            if sender.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::warn!(topic = topic_id, subscription = id, "delivery failed, dropping subscriber");
                self.deregister(topic_id, id);
            }
        }
        delivered
    }

    /// Drops every sender across every topic so each stream terminates
    /// cleanly. Shutdown only.
    pub fn close_all(&self) {
        let mut topics = self.topics.lock().unwrap();
        let total: usize = topics.values().map(HashMap::len).sum();
        topics.clear();
        tracing::info!(closed = total, "closed all subscriptions");
    }

    pub fn subscriber_count(&self, topic_id: &str) -> usize {
        self.topics
            .lock()
            .unwrap()
            .get(topic_id)
            .map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(registry: &SubscriberRegistry, topic: &str) -> (SubscriptionId, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (registry.register(topic, tx), rx)
    }

    #[test]
    fn fanout_reaches_every_subscriber_exactly_once() {
        let registry = SubscriberRegistry::new();
        let mut receivers: Vec<_> = (0..3).map(|_| subscriber(&registry, "t1").1).collect();

        let delivered = registry.broadcast("t1", &"hello".to_owned());
        assert_eq!(delivered, 3);
        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap(), "hello");
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn topics_are_isolated() {
        let registry = SubscriberRegistry::new();
        let (_, mut rx1) = subscriber(&registry, "t1");
        let (_, mut rx2) = subscriber(&registry, "t2");

        registry.broadcast("t1", &"only t1".to_owned());
        assert_eq!(rx1.try_recv().unwrap(), "only t1");
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn broadcast_to_unknown_topic_is_harmless() {
        let registry = SubscriberRegistry::new();
        assert_eq!(registry.broadcast("nobody", &"x".to_owned()), 0);
    }

    #[test]
    fn deregister_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let (id, rx) = subscriber(&registry, "t1");
        drop(rx);
        registry.deregister("t1", id);
        registry.deregister("t1", id);
        assert_eq!(registry.subscriber_count("t1"), 0);
    }

    #[test]
    fn failed_delivery_drops_only_the_dead_subscriber() {
        let registry = SubscriberRegistry::new();
        let (_, mut alive) = subscriber(&registry, "t1");
        let (_, dead) = subscriber(&registry, "t1");
        drop(dead);

        let delivered = registry.broadcast("t1", &"still here".to_owned());
        assert_eq!(delivered, 1);
        assert_eq!(alive.try_recv().unwrap(), "still here");
        assert_eq!(registry.subscriber_count("t1"), 1);
    }

    #[test]
    fn late_subscriber_misses_earlier_broadcast() {
        let registry = SubscriberRegistry::new();
        registry.broadcast("t1", &"early".to_owned());
        let (_, mut rx) = subscriber(&registry, "t1");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_all_empties_the_registry_and_ends_streams() {
        let registry = SubscriberRegistry::new();
        let (_, mut rx1) = subscriber(&registry, "t1");
        let (_, mut rx2) = subscriber(&registry, "t2");

        registry.close_all();
        assert_eq!(registry.subscriber_count("t1"), 0);
        assert_eq!(registry.subscriber_count("t2"), 0);
        // Senders dropped: the receiving streams observe a clean end.
        assert!(matches!(rx1.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
        assert!(matches!(rx2.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }

    #[test]
    fn concurrent_register_and_broadcast_do_not_lose_entries() {
        use std::sync::Arc;
        let registry = Arc::new(SubscriberRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let id = registry.register("t1", tx);
                    registry.broadcast("t1", &"spin".to_owned());
                    drop(rx);
                    registry.deregister("t1", id);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.subscriber_count("t1"), 0);
    }
}
