//! Fan-out hub with a bounded replay cache.
//!
//! Subscribing and publishing both take the hub lock, so a new subscriber sees
//! every value exactly once: either in its replayed prefix or live, never both
//! and never neither.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::mpsc;

pub(crate) type SubscriberId = u64;

pub(crate) struct Multicast<T> {
    hub: Mutex<Hub<T>>,
    replay: usize,
    buffer: usize,
}

struct Hub<T> {
    cache: VecDeque<T>,
    subscribers: Vec<(SubscriberId, mpsc::Sender<T>)>,
    next_id: SubscriberId,
}

impl<T: Clone + Send + 'static> Multicast<T> {
    pub(crate) fn new(replay: usize, buffer: usize) -> Self {
        Self {
            hub: Mutex::new(Hub {
                cache: VecDeque::with_capacity(replay),
                subscribers: Vec::new(),
                next_id: 0,
            }),
            replay,
            buffer: buffer.max(1),
        }
    }

    /// Register a subscriber. Its receiver starts with the replay cache.
    pub(crate) fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<T>) {
        let mut hub = self.hub.lock();
        let (tx, rx) = mpsc::channel(self.buffer + hub.cache.len());
        for value in &hub.cache {
            // Capacity covers the whole cache.
            let _ = tx.try_send(value.clone());
        }
        let id = hub.next_id;
        hub.next_id += 1;
        hub.subscribers.push((id, tx));
        (id, rx)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriberId) {
        self.hub.lock().subscribers.retain(|(sid, _)| *sid != id);
    }

    /// Record `value` in the replay cache and deliver it to every current
    /// subscriber in order. Waits on subscribers whose buffer is full.
    pub(crate) async fn publish(&self, value: T) {
        let targets: Vec<(SubscriberId, mpsc::Sender<T>)> = {
            let mut hub = self.hub.lock();
            if self.replay > 0 {
                if hub.cache.len() == self.replay {
                    hub.cache.pop_front();
                }
                hub.cache.push_back(value.clone());
            }
            hub.subscribers.clone()
        };

        for (id, tx) in targets {
            if tx.send(value.clone()).await.is_err() {
                self.unsubscribe(id);
            }
        }
    }

    pub(crate) fn reset_cache(&self) {
        self.hub.lock().cache.clear();
    }

    #[cfg(test)]
    pub(crate) fn cached(&self) -> Vec<T> {
        self.hub.lock().cache.iter().cloned().collect()
    }
}
