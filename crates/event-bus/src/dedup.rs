use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Default)]
struct Seen {
    keys: HashSet<(String, String)>,
    order: VecDeque<(String, String)>,
}

/// Bounded record of the event ids each consumer has already handled.
///
/// Keys are `(consumer, event_id)`, so two services sharing one store do
/// not shadow each other. The oldest keys are evicted once the capacity is
/// reached.
#[derive(Clone)]
pub struct ProcessedEvents {
    seen: Arc<Mutex<Seen>>,
    capacity: usize,
}

impl Default for ProcessedEvents {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: Arc::new(Mutex::new(Seen::default())),
            capacity: capacity.max(1),
        }
    }

    /// Records the event for the consumer.
    ///
    /// Returns true the first time, false for every redelivery.
    pub async fn claim(&self, consumer: &str, event_id: &str) -> bool {
        let key = (consumer.to_string(), event_id.to_string());
        let mut seen = self.seen.lock().await;
        if !seen.keys.insert(key.clone()) {
            return false;
        }
        seen.order.push_back(key);
        while seen.order.len() > self.capacity {
            if let Some(oldest) = seen.order.pop_front() {
                seen.keys.remove(&oldest);
            }
        }
        true
    }

    /// Forgets a claim so the event can be handled again.
    pub async fn release(&self, consumer: &str, event_id: &str) {
        let key = (consumer.to_string(), event_id.to_string());
        let mut seen = self.seen.lock().await;
        if seen.keys.remove(&key) {
            seen.order.retain(|k| k != &key);
        }
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_claim_is_rejected() {
        let processed = ProcessedEvents::new();
        assert!(processed.claim("inventory", "evt-1").await);
        assert!(!processed.claim("inventory", "evt-1").await);
    }

    #[tokio::test]
    async fn test_consumers_are_independent() {
        let processed = ProcessedEvents::new();
        assert!(processed.claim("inventory", "evt-1").await);
        assert!(processed.claim("payment", "evt-1").await);
        assert_eq!(processed.len().await, 2);
    }

    #[tokio::test]
    async fn test_oldest_claims_are_evicted() {
        let processed = ProcessedEvents::with_capacity(2);
        assert!(processed.claim("c", "1").await);
        assert!(processed.claim("c", "2").await);
        assert!(processed.claim("c", "3").await);
        assert_eq!(processed.len().await, 2);
        assert!(processed.claim("c", "1").await);
        assert!(!processed.claim("c", "3").await);
    }

    #[tokio::test]
    async fn test_release_allows_retry() {
        let processed = ProcessedEvents::new();
        assert!(processed.claim("c", "1").await);
        processed.release("c", "1").await;
        assert!(processed.is_empty().await);
        assert!(processed.claim("c", "1").await);
    }
}
